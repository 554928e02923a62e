// === Environment ===
pub fn api_url() -> String {
    std::env::var("SOCIO_API_URL")
        .ok()
        .map(|v| v.trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "http://127.0.0.1:5000".to_string())
}

pub fn bind_address() -> String {
    std::env::var("SOCIO_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
}

pub fn session_hours() -> i64 {
    parse_session_hours(std::env::var("SOCIO_SESSION_HOURS").ok().as_deref())
}

/// Whole hours in `1..=MAX_SESSION_HOURS`, otherwise the one-day default.
fn parse_session_hours(value: Option<&str>) -> i64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|h| (1..=MAX_SESSION_HOURS).contains(h))
        .unwrap_or(DEFAULT_SESSION_HOURS)
}

/// Upper bound on per-session view state held in memory.
pub fn max_sessions() -> usize {
    std::env::var("SOCIO_MAX_SESSIONS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_SESSIONS)
        .max(1)
}

pub fn feed_limit() -> usize {
    std::env::var("SOCIO_FEED_LIMIT")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_FEED_LIMIT)
        .max(1)
}

/// Which post identifier the comment like/delete endpoints receive as `post_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentPostKey {
    Upid,
    Id,
}

pub fn comment_post_key() -> CommentPostKey {
    match std::env::var("SOCIO_COMMENT_POST_KEY").as_deref() {
        Ok("id") | Ok("_id") => CommentPostKey::Id,
        _ => CommentPostKey::Upid,
    }
}

// === Constants ===
pub const DEFAULT_FEED_LIMIT: usize = 15;
pub const MAX_POST_LENGTH: usize = 500;
pub const DEFAULT_SESSION_HOURS: i64 = 24;
pub const MAX_SESSION_HOURS: i64 = 24 * 365;
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

pub const TOKEN_COOKIE: &str = "sociotoken";
pub const USER_COOKIE: &str = "socio-user";
pub const PICTURE_COOKIE: &str = "socio-pf";
pub const ISSUED_COOKIE: &str = "socio-at";

pub const IMAGE_HOST: &str = "https://lh3.googleusercontent.com/d/";
pub const DEFAULT_AVATAR: &str = "/static/d-prof.svg";
pub const NO_IMAGE: &str = "none";

pub const LOGIN_REDIRECT_MS: u64 = 1500;
pub const SIGNUP_REDIRECT_MS: u64 = 1000;

/// Signup responses carry a numeric `message` above this value on failure.
pub const SIGNUP_ERROR_FLOOR: i64 = 1000;
pub const DUPLICATE_KEY_CODE: i64 = 11000;
