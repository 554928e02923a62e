use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::api::SocioApi;
use crate::config::{DUPLICATE_KEY_CODE, LOGIN_REDIRECT_MS, SIGNUP_ERROR_FLOOR, SIGNUP_REDIRECT_MS};
use crate::core::notice::Notice;
use crate::models::models::Credentials;
use crate::session::Session;

/// Navigate to `to` once `after` has elapsed (the toast stays visible meanwhile).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    pub after: Duration,
}

impl Redirect {
    pub fn new(to: &str, after_ms: u64) -> Self {
        Redirect { to: to.to_string(), after: Duration::from_millis(after_ms) }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug)]
pub struct LoginSuccess {
    pub session: Session,
    pub notice: Notice,
    pub redirect: Redirect,
}

pub async fn login<A: SocioApi>(api: &A, form: &LoginForm) -> Result<LoginSuccess, Notice> {
    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return Err(Notice::error("Username and password are required"));
    }

    let creds = Credentials { username: username.to_string(), password: form.password.clone() };
    match api.login(&creds).await {
        Ok(resp) => match resp.token.filter(|t| !t.is_empty()) {
            Some(token) => {
                info!(username, "logged in");
                Ok(LoginSuccess {
                    session: Session::new(&token, username),
                    notice: Notice::success("Login successful! Redirecting..."),
                    redirect: Redirect::new("/", LOGIN_REDIRECT_MS),
                })
            }
            None => Err(Notice::error("Invalid credentials")),
        },
        Err(err) => {
            warn!(username, error = %err, "login failed");
            Err(Notice::from_error(&err, "Login failed. Please try again."))
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Terms checkbox; browsers send "on" when ticked and omit it otherwise.
    #[serde(default)]
    pub agree: Option<String>,
}

impl SignupForm {
    pub fn agrees(&self) -> bool {
        matches!(self.agree.as_deref(), Some("on") | Some("true") | Some("1"))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct SignupOutcome {
    pub notice: Notice,
    pub redirect: Option<Redirect>,
}

pub async fn signup<A: SocioApi>(api: &A, form: &SignupForm) -> SignupOutcome {
    if !form.agrees() {
        return SignupOutcome {
            notice: Notice::error("You must agree to the Terms & Conditions"),
            redirect: None,
        };
    }

    let username = form.username.trim();
    let creds = Credentials { username: username.to_string(), password: form.password.clone() };
    let failed = |notice| SignupOutcome {
        notice,
        redirect: Some(Redirect::new("/signup", SIGNUP_REDIRECT_MS)),
    };

    match api.signup(&creds).await {
        Ok(resp) => match failure_code(&resp.message) {
            Some(code) => {
                warn!(username, code, "signup rejected");
                if code == DUPLICATE_KEY_CODE {
                    failed(Notice::error(format!("Username '{}' already exists", username)))
                } else {
                    failed(Notice::error("Signup failed"))
                }
            }
            _ => {
                info!(username, "signed up");
                SignupOutcome {
                    notice: Notice::success("Signup successful!"),
                    redirect: Some(Redirect::new("/login", SIGNUP_REDIRECT_MS)),
                }
            }
        },
        Err(err) => {
            warn!(username, error = %err, "signup failed");
            failed(Notice::from_error(&err, "Signup failed"))
        }
    }
}

/// A signup failure code: a number, or a string holding one, above the floor.
fn failure_code(message: &serde_json::Value) -> Option<i64> {
    message
        .as_i64()
        .or_else(|| message.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|code| *code > SIGNUP_ERROR_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;
    use serde_json::json;

    fn login_form(username: &str, password: &str) -> LoginForm {
        LoginForm { username: username.to_string(), password: password.to_string() }
    }

    fn signup_form(agree: Option<&str>) -> SignupForm {
        SignupForm {
            username: "ana".to_string(),
            password: "secret".to_string(),
            agree: agree.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn login_stores_token_and_redirects_home() {
        let api = FakeApi::new();
        *api.token.borrow_mut() = Some("tok-1".to_string());

        let ok = login(&api, &login_form("ana", "secret")).await.unwrap();
        assert_eq!(ok.session.token, "tok-1");
        assert_eq!(ok.session.username, "ana");
        assert_eq!(ok.redirect, Redirect::new("/", 1500));
        assert_eq!(ok.session.cookies().len(), 3);
    }

    #[tokio::test]
    async fn login_without_token_is_invalid_credentials() {
        let api = FakeApi::new();
        let err = login(&api, &login_form("ana", "wrong")).await.unwrap_err();
        assert_eq!(err, Notice::error("Invalid credentials"));
    }

    #[tokio::test]
    async fn login_failure_uses_fallback_text() {
        let api = FakeApi::new();
        api.fail("login");
        let err = login(&api, &login_form("ana", "secret")).await.unwrap_err();
        assert_eq!(err.message, "Login failed. Please try again.");
    }

    #[tokio::test]
    async fn blank_login_makes_no_call() {
        let api = FakeApi::new();
        assert!(login(&api, &login_form("  ", "x")).await.is_err());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn signup_without_agreement_never_reaches_backend() {
        let api = FakeApi::new();
        let outcome = signup(&api, &signup_form(None)).await;
        assert_eq!(outcome.notice, Notice::error("You must agree to the Terms & Conditions"));
        assert_eq!(outcome.redirect, None);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn signup_success_goes_to_login() {
        let api = FakeApi::new();
        *api.signup_message.borrow_mut() = json!("User created");
        let outcome = signup(&api, &signup_form(Some("on"))).await;
        assert_eq!(outcome.redirect, Some(Redirect::new("/login", 1000)));
        assert!(api.called("signup"));
    }

    #[tokio::test]
    async fn duplicate_username_is_reported() {
        let api = FakeApi::new();
        *api.signup_message.borrow_mut() = json!(11000);
        let outcome = signup(&api, &signup_form(Some("on"))).await;
        assert_eq!(outcome.notice.message, "Username 'ana' already exists");
        assert_eq!(outcome.redirect, Some(Redirect::new("/signup", 1000)));

        *api.signup_message.borrow_mut() = json!(2001);
        let outcome = signup(&api, &signup_form(Some("on"))).await;
        assert_eq!(outcome.notice.message, "Signup failed");
    }

    #[tokio::test]
    async fn numeric_string_codes_count_as_failures() {
        let api = FakeApi::new();
        *api.signup_message.borrow_mut() = json!("11000");
        let outcome = signup(&api, &signup_form(Some("on"))).await;
        assert_eq!(outcome.notice.message, "Username 'ana' already exists");

        assert_eq!(failure_code(&json!("500")), None);
        assert_eq!(failure_code(&json!("User created")), None);
        assert_eq!(failure_code(&json!(" 1001 ")), Some(1001));
    }
}
