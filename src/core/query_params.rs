/// The decoded value of `key` in a raw query string such as `tab=trash&stay`.
/// A bare `key` yields an empty value.
pub fn query_value(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        (name == key).then(|| {
            let value = value.replace('+', " ");
            urlencoding::decode(&value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.clone())
        })
    })
}

/// `?stay`, `?stay=true` and `?stay=1` all set the flag.
pub fn has_flag(query: &str, key: &str) -> bool {
    matches!(query_value(query, key).as_deref(), Some("" | "true" | "1"))
}
