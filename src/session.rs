use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::HttpRequest;
use chrono::{DateTime, Duration, Utc};
use crate::config::{session_hours, ISSUED_COOKIE, PICTURE_COOKIE, TOKEN_COOKIE, USER_COOKIE};

/// Token and username handed out by `/login`, kept client-side as cookies.
///
/// The token is never inspected locally; it is only presented to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub profile_picture: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: &str, username: &str) -> Self {
        Session {
            token: token.to_string(),
            username: username.to_string(),
            profile_picture: None,
            issued_at: Utc::now(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        expiry(self.issued_at, session_hours())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Rebuild a session from the browser's cookies. Expired sessions are
    /// treated as absent.
    pub fn from_request(req: &HttpRequest) -> Option<Self> {
        let token = req.cookie(TOKEN_COOKIE)?.value().to_string();
        let username = req.cookie(USER_COOKIE)?.value().to_string();
        if token.is_empty() || username.is_empty() {
            return None;
        }
        let mut session = Session::new(&token, &username);
        session.profile_picture = req
            .cookie(PICTURE_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty());
        if let Some(issued) = req
            .cookie(ISSUED_COOKIE)
            .and_then(|c| c.value().parse::<i64>().ok())
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
        {
            session.issued_at = issued;
        }
        (!session.is_expired(Utc::now())).then_some(session)
    }

    pub fn cookies(&self) -> Vec<Cookie<'static>> {
        let max_age = CookieDuration::seconds(session_hours() * 3600);
        let mut cookies = vec![
            session_cookie(TOKEN_COOKIE, self.token.clone(), max_age),
            session_cookie(USER_COOKIE, self.username.clone(), max_age),
            session_cookie(ISSUED_COOKIE, self.issued_at.timestamp().to_string(), max_age),
        ];
        if let Some(pf) = &self.profile_picture {
            cookies.push(session_cookie(PICTURE_COOKIE, pf.clone(), max_age));
        }
        cookies
    }
}

/// `issued_at` plus `hours`; an unrepresentable result never expires.
pub fn expiry(issued_at: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    Duration::try_hours(hours)
        .and_then(|d| issued_at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn session_cookie(name: &'static str, value: String, max_age: CookieDuration) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .max_age(max_age)
        .http_only(true)
        .finish()
}

/// Expired copies of every session cookie, for logout.
pub fn removal_cookies() -> Vec<Cookie<'static>> {
    [TOKEN_COOKIE, USER_COOKIE, ISSUED_COOKIE, PICTURE_COOKIE]
        .into_iter()
        .map(|name| {
            let mut cookie = Cookie::build(name, "").path("/").finish();
            cookie.make_removal();
            cookie
        })
        .collect()
}
