use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder, ResponseError};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::api::{HttpApi, SocioApi};
use crate::auth::{self, LoginForm, SignupForm};
use crate::config;
use crate::core::notice::Notice;
use crate::core::query_params::{has_flag, query_value};
use crate::core::static_server::serve_static;
use crate::posts::{FeedAction, FeedView, PostComposer, PostForm};
use crate::session::{removal_cookies, Session};
use crate::templates::{self, Page};
use crate::users::{PeopleView, ProfileAction, ProfileTab, ProfileView};

// === Shared state ===

/// Everything one browser session has on screen.
#[derive(Default)]
pub struct SessionViews {
    feed: Option<FeedView>,
    profile: Option<ProfileView>,
}

impl SessionViews {
    /// Whether the backend has answered this session with real data.
    fn established(&self) -> bool {
        self.feed.as_ref().is_some_and(|f| f.posts.loaded_once())
            || self.profile.as_ref().is_some_and(|p| p.profile.is_some())
    }
}

struct SessionSlot {
    views: Arc<AsyncMutex<SessionViews>>,
    expires_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
}

pub struct AppState {
    pub api: HttpApi,
    pub feed_limit: usize,
    max_sessions: usize,
    sessions: Mutex<HashMap<String, SessionSlot>>,
}

impl AppState {
    pub fn new(api: HttpApi, feed_limit: usize) -> Self {
        AppState {
            api,
            feed_limit,
            max_sessions: config::DEFAULT_MAX_SESSIONS,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(HttpApi::new(&config::api_url()), config::feed_limit())
            .max_sessions(config::max_sessions())
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max.max(1);
        self
    }

    /// The session's views. Actions of one session run one at a time.
    ///
    /// Expired slots are dropped first; a new slot past capacity evicts the
    /// least recently used one.
    fn views(&self, session: &Session) -> Arc<AsyncMutex<SessionViews>> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, slot| slot.expires_at > now);

        if !sessions.contains_key(&session.token) && sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(token, _)| token.clone());
            if let Some(token) = oldest {
                debug!("evicting least recently used session views");
                sessions.remove(&token);
            }
        }

        let slot = sessions.entry(session.token.clone()).or_insert_with(|| SessionSlot {
            views: Arc::default(),
            expires_at: session.expires_at(),
            last_used: now,
        });
        slot.last_used = now;
        slot.views.clone()
    }

    /// Keep the session's views only while its token is good: a 401, or no
    /// successful load yet, drops them.
    fn settle(&self, session: &Session, api: &HttpApi, views: &SessionViews) {
        if api.token_rejected() {
            info!(username = %session.username, "backend rejected session token");
            self.forget(&session.token);
        } else if !views.established() {
            self.forget(&session.token);
        }
    }

    fn forget(&self, token: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(token);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or_default()
    }
}

// === Errors ===

/// Rendering failure, shown as an error page.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PageError(#[from] anyhow::Error);

impl ResponseError for PageError {
    fn error_response(&self) -> HttpResponse {
        error!(error = %self.0, "page error");
        let body = Page::new("Error", None, templates::error_body("The page could not be rendered"))
            .render()
            .unwrap_or_else(|_| "Internal server error".to_string());
        HttpResponse::InternalServerError()
            .content_type("text/html; charset=utf-8")
            .body(body)
    }
}

type PageResult = Result<HttpResponse, PageError>;

fn html(mut builder: HttpResponseBuilder, page: Page<'_>) -> PageResult {
    Ok(builder.content_type("text/html; charset=utf-8").body(page.render()?))
}

fn see_other(to: &str) -> HttpResponse {
    HttpResponse::SeeOther().insert_header((header::LOCATION, to)).finish()
}

/// The caller's session, or a redirect to the login page.
fn require_session(req: &HttpRequest) -> Result<Session, HttpResponse> {
    match Session::from_request(req) {
        Some(session) => Ok(session),
        None => Err(see_other("/login")),
    }
}

/// POSTed actions redirect back with `?stay` so the GET renders kept state
/// instead of mounting the view afresh.
fn stays(req: &HttpRequest) -> bool {
    has_flag(req.query_string(), "stay")
}

// === Routes ===

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(home))
        .service(
            web::resource("/login")
                .route(web::get().to(login_page))
                .route(web::post().to(login_submit)),
        )
        .service(
            web::resource("/signup")
                .route(web::get().to(signup_page))
                .route(web::post().to(signup_submit)),
        )
        .route("/logout", web::get().to(logout))
        .service(
            web::resource("/feed")
                .route(web::get().to(feed_page))
                .route(web::post().to(feed_action)),
        )
        .route("/people", web::get().to(people_page))
        .service(
            web::resource("/post")
                .route(web::get().to(composer_page))
                .route(web::post().to(composer_submit)),
        )
        .service(
            web::resource("/profile/{username}")
                .route(web::get().to(profile_page))
                .route(web::post().to(profile_action)),
        )
        .route("/static/{tail:.*}", web::get().to(static_file));
}

async fn home(req: HttpRequest) -> PageResult {
    let session = Session::from_request(&req);
    html(
        HttpResponse::Ok(),
        Page::new("Home", session.as_ref(), templates::home_body(session.as_ref())),
    )
}

async fn static_file(req: HttpRequest) -> HttpResponse {
    serve_static(req.path())
}

// --- Auth ---

async fn login_page() -> PageResult {
    html(HttpResponse::Ok(), Page::new("Login", None, templates::login_body(&LoginForm::default())))
}

async fn login_submit(state: web::Data<AppState>, form: web::Form<LoginForm>) -> PageResult {
    match auth::login(&state.api, &form).await {
        Ok(success) => {
            let mut session = success.session;
            let authed = state.api.with_token(&session.token);
            match authed.person(&session.username).await {
                Ok(profile) => session.profile_picture = profile.profile_picture,
                Err(err) => warn!(error = %err, "could not fetch profile picture after login"),
            }

            let mut builder = HttpResponse::Ok();
            for cookie in session.cookies() {
                builder.cookie(cookie);
            }
            html(
                builder,
                Page::new("Login", Some(&session), String::new())
                    .notice(Some(success.notice))
                    .redirect(Some(&success.redirect)),
            )
        }
        Err(notice) => html(
            HttpResponse::Ok(),
            Page::new("Login", None, templates::login_body(&form)).notice(Some(notice)),
        ),
    }
}

async fn signup_page() -> PageResult {
    html(HttpResponse::Ok(), Page::new("Sign up", None, templates::signup_body(&SignupForm::default())))
}

async fn signup_submit(state: web::Data<AppState>, form: web::Form<SignupForm>) -> PageResult {
    let outcome = auth::signup(&state.api, &form).await;
    let body = match outcome.redirect {
        Some(_) => String::new(),
        None => templates::signup_body(&form),
    };
    html(
        HttpResponse::Ok(),
        Page::new("Sign up", None, body)
            .notice(Some(outcome.notice))
            .redirect(outcome.redirect.as_ref()),
    )
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    if let Some(session) = Session::from_request(&req) {
        state.forget(&session.token);
        info!(username = %session.username, "logged out");
    }
    let mut resp = HttpResponse::SeeOther();
    resp.insert_header((header::LOCATION, "/login"));
    for cookie in removal_cookies() {
        resp.cookie(cookie);
    }
    resp.finish()
}

// --- Feed ---

async fn feed_page(state: web::Data<AppState>, req: HttpRequest) -> PageResult {
    let session = match require_session(&req) {
        Ok(s) => s,
        Err(redirect) => return Ok(redirect),
    };
    let api = state.api.with_token(&session.token);
    let views = state.views(&session);
    let mut views = views.lock().await;

    let kept = views.feed.take().filter(|_| stays(&req));
    let feed = match kept {
        Some(feed) => views.feed.insert(feed),
        None => {
            let feed = views.feed.insert(FeedView::new(&session, state.feed_limit));
            feed.load(&api).await;
            feed
        }
    };

    let notice = feed.take_notice();
    let body = templates::feed_body(feed, Utc::now());
    state.settle(&session, &api, &views);
    html(HttpResponse::Ok(), Page::new("Feed", Some(&session), body).notice(notice))
}

async fn feed_action(
    state: web::Data<AppState>,
    req: HttpRequest,
    action: web::Form<FeedAction>,
) -> HttpResponse {
    let session = match require_session(&req) {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };
    let api = state.api.with_token(&session.token);
    let views = state.views(&session);
    let mut views = views.lock().await;

    let feed = views.feed.get_or_insert_with(|| FeedView::new(&session, state.feed_limit));
    if !feed.posts.loaded_once() {
        feed.load(&api).await;
    }
    feed.dispatch(&api, action.into_inner()).await;
    state.settle(&session, &api, &views);
    see_other("/feed?stay")
}

// --- People ---

async fn people_page(state: web::Data<AppState>, req: HttpRequest) -> PageResult {
    let session = match require_session(&req) {
        Ok(s) => s,
        Err(redirect) => return Ok(redirect),
    };
    let api = state.api.with_token(&session.token);

    let mut people = PeopleView::new();
    people.load(&api, &session).await;
    if api.token_rejected() {
        state.forget(&session.token);
    }

    let notice = people.notice.take();
    let body = templates::people_body(&people);
    html(HttpResponse::Ok(), Page::new("People", Some(&session), body).notice(notice))
}

// --- Composer ---

async fn composer_page(req: HttpRequest) -> PageResult {
    let session = match require_session(&req) {
        Ok(s) => s,
        Err(redirect) => return Ok(redirect),
    };
    let body = templates::composer_body(&PostComposer::new());
    html(HttpResponse::Ok(), Page::new("Make a Post", Some(&session), body))
}

async fn composer_submit(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<PostForm>,
) -> PageResult {
    let session = match require_session(&req) {
        Ok(s) => s,
        Err(redirect) => return Ok(redirect),
    };
    let api = state.api.with_token(&session.token);
    let views = state.views(&session);
    let mut views = views.lock().await;

    let mut composer = PostComposer::new();
    composer.fill(&form);
    let response = match composer.submit(&api, &session).await {
        Ok(redirect) => {
            let mut feed = FeedView::new(&session, state.feed_limit);
            feed.load(&api).await;
            feed.notice = Some(Notice::success("Post created successfully!"));
            views.feed = Some(feed);
            see_other(&format!("{}?stay", redirect.to))
        }
        Err(notice) => {
            let body = templates::composer_body(&composer);
            html(
                HttpResponse::Ok(),
                Page::new("Make a Post", Some(&session), body).notice(Some(notice)),
            )?
        }
    };
    state.settle(&session, &api, &views);
    Ok(response)
}

// --- Profile ---

async fn profile_page(
    state: web::Data<AppState>,
    req: HttpRequest,
    username: web::Path<String>,
) -> PageResult {
    let session = match require_session(&req) {
        Ok(s) => s,
        Err(redirect) => return Ok(redirect),
    };
    let username = username.into_inner();
    let api = state.api.with_token(&session.token);
    let views = state.views(&session);
    let mut views = views.lock().await;

    let kept = views
        .profile
        .take()
        .filter(|p| p.username == username && stays(&req));
    let profile = match kept {
        Some(profile) => views.profile.insert(profile),
        None => {
            let profile = views.profile.insert(ProfileView::new(&session, &username));
            profile.load(&api).await;
            profile
        }
    };
    match query_value(req.query_string(), "tab").as_deref() {
        Some("trash") => profile.show_tab(ProfileTab::Trash),
        Some("posts") => profile.show_tab(ProfileTab::Posts),
        _ => {}
    }

    let notice = profile.take_notice();
    let body = templates::profile_body(profile, Utc::now());
    state.settle(&session, &api, &views);
    html(HttpResponse::Ok(), Page::new(&username, Some(&session), body).notice(notice))
}

async fn profile_action(
    state: web::Data<AppState>,
    req: HttpRequest,
    username: web::Path<String>,
    action: web::Form<ProfileAction>,
) -> HttpResponse {
    let session = match require_session(&req) {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };
    let username = username.into_inner();
    let api = state.api.with_token(&session.token);
    let views = state.views(&session);
    let mut views = views.lock().await;

    let kept = views.profile.take().filter(|p| p.username == username);
    let profile = match kept {
        Some(profile) => views.profile.insert(profile),
        None => {
            let profile = views.profile.insert(ProfileView::new(&session, &username));
            profile.load(&api).await;
            profile
        }
    };
    profile.dispatch(&api, action.into_inner()).await;
    state.settle(&session, &api, &views);
    see_other(&format!("/profile/{}?stay", urlencoding::encode(&username)))
}
