use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::config::{DEFAULT_AVATAR, IMAGE_HOST, NO_IMAGE};

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

/// Client-side post identifier, generated once per composer.
pub fn new_upid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Hosted image URL for a stored image id, if the id names an image.
pub fn image_url(id: Option<&str>) -> Option<String> {
    match id.map(str::trim) {
        Some(id) if !id.is_empty() && id != NO_IMAGE => Some(format!("{}{}", IMAGE_HOST, id)),
        _ => None,
    }
}

pub fn avatar_url(id: Option<&str>) -> String {
    image_url(id).unwrap_or_else(|| DEFAULT_AVATAR.to_string())
}

/// "3 minutes ago" style rendering of an RFC 3339 timestamp.
pub fn time_ago(date: &str, now: DateTime<Utc>) -> String {
    let Ok(then) = DateTime::parse_from_rfc3339(date) else {
        return date.to_string();
    };
    let secs = (now - then.with_timezone(&Utc)).num_seconds();
    if secs < 0 {
        return "just now".to_string();
    }

    let (value, unit) = match secs {
        0..=44 => return "just now".to_string(),
        45..=3_599 => ((secs + 30) / 60, "minute"),
        3_600..=86_399 => (secs / 3_600, "hour"),
        86_400..=2_591_999 => (secs / 86_400, "day"),
        2_592_000..=31_535_999 => (secs / 2_592_000, "month"),
        _ => (secs / 31_536_000, "year"),
    };
    let value = value.max(1);
    if value == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", value, unit)
    }
}
