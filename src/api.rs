//! Typed access to the Socio backend.
//!
//! Views talk to the backend only through [`SocioApi`], so they can be driven
//! by [`HttpApi`] in production and by an in-memory fake in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::StatusCode;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::core::errors::{ClientError, ClientResult};
use crate::models::models::*;
use crate::sync::Cursor;

#[allow(async_fn_in_trait)]
pub trait SocioApi {
    async fn login(&self, creds: &Credentials) -> ClientResult<LoginResponse>;
    async fn signup(&self, creds: &Credentials) -> ClientResult<SignupResponse>;

    async fn feed(&self, limit: usize, offset: usize) -> ClientResult<FeedPage>;
    async fn create_post(&self, post: &NewPost) -> ClientResult<Ack>;
    async fn like_post(&self, post_id: &str) -> ClientResult<()>;
    async fn trash_post(&self, post_id: &str) -> ClientResult<()>;
    async fn delete_permanently(&self, post_id: &str) -> ClientResult<()>;
    async fn restore_post(&self, post_id: &str) -> ClientResult<()>;

    async fn add_comment(&self, comment: &NewComment) -> ClientResult<()>;
    async fn like_comment(&self, target: &CommentRef) -> ClientResult<()>;
    async fn delete_comment(&self, target: &CommentRef) -> ClientResult<()>;

    async fn people(&self) -> ClientResult<Vec<Person>>;
    async fn person(&self, username: &str) -> ClientResult<Profile>;
    async fn user_posts(&self, username: &str) -> ClientResult<Vec<Post>>;
    async fn trash(&self) -> ClientResult<Vec<Post>>;
    async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<Ack>;
    async fn follow(&self, uid: &str) -> ClientResult<FollowResponse>;
}

/// `reqwest`-backed client. Cheap to clone; one per session via [`HttpApi::with_token`].
#[derive(Clone, Debug)]
pub struct HttpApi {
    http: Client,
    base_url: String,
    token: Option<String>,
    /// Set once the backend answers 401 to this token.
    rejected: Arc<AtomicBool>,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Self {
        HttpApi {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            rejected: Arc::default(),
        }
    }

    pub fn with_token(&self, token: &str) -> Self {
        HttpApi {
            token: Some(token.to_string()),
            rejected: Arc::default(),
            ..self.clone()
        }
    }

    /// Whether any call made with this token came back unauthenticated.
    pub fn token_rejected(&self) -> bool {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> ClientResult<Response> {
        let resp = builder.send().await?;
        let status = resp.status();
        debug!(url = %resp.url(), status = status.as_u16(), "backend response");
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED && self.token.is_some() {
            self.rejected.store(true, Ordering::Relaxed);
            return Err(ClientError::Unauthenticated);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(ClientError::status(status, error_message(status, &text)))
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let resp = self.send(builder).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn call<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: &B) -> ClientResult<()> {
        self.send(self.request(method, path).json(body)).await?;
        Ok(())
    }
}

/// Pull a readable message out of an error body: `{"message"}` or
/// `{"error"}` when JSON, the raw text otherwise.
fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body).ok().and_then(|v| {
        ["message", "error"]
            .iter()
            .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
    });
    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() && body.len() < 200 => body.trim().to_string(),
        None => status.canonical_reason().unwrap_or("Request failed").to_string(),
    }
}

impl SocioApi for HttpApi {
    async fn login(&self, creds: &Credentials) -> ClientResult<LoginResponse> {
        self.json(self.request(Method::POST, "/login").json(creds)).await
    }

    async fn signup(&self, creds: &Credentials) -> ClientResult<SignupResponse> {
        self.json(self.request(Method::POST, "/signup").json(creds)).await
    }

    async fn feed(&self, limit: usize, offset: usize) -> ClientResult<FeedPage> {
        let page = Cursor::query(limit, offset);
        self.json(self.request(Method::GET, "/feed").query(&page)).await
    }

    async fn create_post(&self, post: &NewPost) -> ClientResult<Ack> {
        self.json(self.request(Method::POST, "/post").json(post)).await
    }

    async fn like_post(&self, post_id: &str) -> ClientResult<()> {
        self.call(Method::POST, "/like", &json!({ "id": post_id })).await
    }

    async fn trash_post(&self, post_id: &str) -> ClientResult<()> {
        self.call(Method::DELETE, "/post", &json!({ "id": post_id })).await
    }

    async fn delete_permanently(&self, post_id: &str) -> ClientResult<()> {
        self.call(Method::DELETE, "/myTrash", &json!({ "id": post_id })).await
    }

    async fn restore_post(&self, post_id: &str) -> ClientResult<()> {
        self.call(Method::PUT, "/myTrash", &json!({ "id": post_id })).await
    }

    async fn add_comment(&self, comment: &NewComment) -> ClientResult<()> {
        self.call(Method::PUT, "/comment", comment).await
    }

    async fn like_comment(&self, target: &CommentRef) -> ClientResult<()> {
        self.call(Method::POST, "/comment", target).await
    }

    async fn delete_comment(&self, target: &CommentRef) -> ClientResult<()> {
        self.call(Method::DELETE, "/comment", target).await
    }

    async fn people(&self) -> ClientResult<Vec<Person>> {
        let value: serde_json::Value = self.json(self.request(Method::GET, "/people")).await?;
        if !value.is_array() {
            return Err(ClientError::validation("Invalid data received from server"));
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn person(&self, username: &str) -> ClientResult<Profile> {
        self.json(self.request(Method::POST, "/person").json(&json!({ "username": username })))
            .await
    }

    async fn user_posts(&self, username: &str) -> ClientResult<Vec<Post>> {
        self.json(self.request(Method::POST, "/myPosts").json(&json!({ "username": username })))
            .await
    }

    async fn trash(&self) -> ClientResult<Vec<Post>> {
        self.json(self.request(Method::GET, "/myTrash")).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<Ack> {
        self.json(self.request(Method::PUT, "/profile").json(update)).await
    }

    async fn follow(&self, uid: &str) -> ClientResult<FollowResponse> {
        let resp = self
            .send(self.request(Method::POST, "/follow").json(&json!({ "uid": uid })))
            .await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        // Older backends answer with an empty or non-JSON body
        let body: FollowBody = serde_json::from_slice(&bytes).unwrap_or_default();
        Ok(FollowResponse { status, following: body.following })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory backend for view tests.

    use std::cell::RefCell;
    use std::collections::HashSet;

    use super::*;

    #[derive(Default)]
    pub struct FakeApi {
        pub feed: RefCell<Vec<Post>>,
        pub people: RefCell<Vec<Person>>,
        pub profiles: RefCell<Vec<Profile>>,
        pub posts: RefCell<Vec<Post>>,
        pub trash: RefCell<Vec<Post>>,
        pub token: RefCell<Option<String>>,
        pub signup_message: RefCell<serde_json::Value>,
        pub follow_reply: RefCell<Option<FollowResponse>>,
        /// Operation names that fail with a 500.
        pub failing: RefCell<HashSet<&'static str>>,
        /// Every call made, in order, as `name` or `name:arg`.
        pub calls: RefCell<Vec<String>>,
    }

    impl FakeApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail(&self, op: &'static str) {
            self.failing.borrow_mut().insert(op);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        pub fn called(&self, op: &str) -> bool {
            self.calls.borrow().iter().any(|c| c == op || c.starts_with(&format!("{}:", op)))
        }

        fn record(&self, op: &'static str, arg: &str) -> ClientResult<()> {
            let entry = if arg.is_empty() { op.to_string() } else { format!("{}:{}", op, arg) };
            self.calls.borrow_mut().push(entry);
            if self.failing.borrow().contains(op) {
                return Err(ClientError::status(StatusCode::INTERNAL_SERVER_ERROR, ""));
            }
            Ok(())
        }
    }

    pub fn post(id: &str, author: &str, likes: &[&str]) -> Post {
        Post {
            id: id.to_string(),
            upid: format!("up-{}", id),
            post: PostBody {
                content: format!("post {}", id),
                likes: likes.len() as u64,
                liked_by: likes.iter().map(|u| Liker::named(u)).collect(),
                comments: Vec::new(),
            },
            meta: MetaData {
                author: author.to_string(),
                profile_picture: None,
                date: "2024-01-01T00:00:00Z".to_string(),
            },
            post_img: None,
            category: None,
        }
    }

    pub fn comment(id: &str, by: &str, likes: &[&str]) -> Comment {
        Comment {
            comment_id: id.to_string(),
            comment: format!("comment {}", id),
            comment_by: Some(by.to_string()),
            profile_pic: None,
            date: "2024-01-01T00:00:00Z".to_string(),
            liked_by: likes.iter().map(|u| Liker::named(u)).collect(),
        }
    }

    pub fn person(username: &str, prefs: &[&str]) -> Person {
        Person {
            username: username.to_string(),
            uid: format!("uid-{}", username),
            category_pref: prefs.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    impl SocioApi for FakeApi {
        async fn login(&self, creds: &Credentials) -> ClientResult<LoginResponse> {
            self.record("login", &creds.username)?;
            Ok(LoginResponse { token: self.token.borrow().clone() })
        }

        async fn signup(&self, creds: &Credentials) -> ClientResult<SignupResponse> {
            self.record("signup", &creds.username)?;
            Ok(SignupResponse { message: self.signup_message.borrow().clone() })
        }

        async fn feed(&self, limit: usize, offset: usize) -> ClientResult<FeedPage> {
            self.record("feed", &offset.to_string())?;
            let all = self.feed.borrow();
            Ok(FeedPage {
                paginated_feed: all.iter().skip(offset).take(limit).cloned().collect(),
                total: all.len() as u64,
            })
        }

        async fn create_post(&self, post: &NewPost) -> ClientResult<Ack> {
            self.record("create_post", &post.upid)?;
            Ok(Ack { status: Some(201), message: Some("Post created".to_string()) })
        }

        async fn like_post(&self, post_id: &str) -> ClientResult<()> {
            self.record("like_post", post_id)
        }

        async fn trash_post(&self, post_id: &str) -> ClientResult<()> {
            self.record("trash_post", post_id)?;
            let mut posts = self.posts.borrow_mut();
            if let Some(idx) = posts.iter().position(|p| p.id == post_id) {
                self.trash.borrow_mut().push(posts.remove(idx));
            }
            self.feed.borrow_mut().retain(|p| p.id != post_id);
            Ok(())
        }

        async fn delete_permanently(&self, post_id: &str) -> ClientResult<()> {
            self.record("delete_permanently", post_id)?;
            self.trash.borrow_mut().retain(|p| p.id != post_id);
            Ok(())
        }

        async fn restore_post(&self, post_id: &str) -> ClientResult<()> {
            self.record("restore_post", post_id)?;
            let mut trash = self.trash.borrow_mut();
            if let Some(idx) = trash.iter().position(|p| p.id == post_id) {
                self.posts.borrow_mut().push(trash.remove(idx));
            }
            Ok(())
        }

        async fn add_comment(&self, comment: &NewComment) -> ClientResult<()> {
            self.record("add_comment", &comment.id)
        }

        async fn like_comment(&self, target: &CommentRef) -> ClientResult<()> {
            self.record("like_comment", &format!("{}/{}", target.post_id, target.comment_id))
        }

        async fn delete_comment(&self, target: &CommentRef) -> ClientResult<()> {
            self.record("delete_comment", &format!("{}/{}", target.post_id, target.comment_id))?;
            for list in [&self.feed, &self.posts] {
                for p in list.borrow_mut().iter_mut() {
                    if p.upid == target.post_id || p.id == target.post_id {
                        p.post.comments.retain(|c| c.comment_id != target.comment_id);
                    }
                }
            }
            Ok(())
        }

        async fn people(&self) -> ClientResult<Vec<Person>> {
            self.record("people", "")?;
            Ok(self.people.borrow().clone())
        }

        async fn person(&self, username: &str) -> ClientResult<Profile> {
            self.record("person", username)?;
            self.profiles
                .borrow()
                .iter()
                .find(|p| p.username == username)
                .cloned()
                .ok_or_else(|| ClientError::status(StatusCode::NOT_FOUND, "User not found"))
        }

        async fn user_posts(&self, username: &str) -> ClientResult<Vec<Post>> {
            self.record("user_posts", username)?;
            Ok(self.posts.borrow().iter().filter(|p| p.meta.author == username).cloned().collect())
        }

        async fn trash(&self) -> ClientResult<Vec<Post>> {
            self.record("trash", "")?;
            Ok(self.trash.borrow().clone())
        }

        async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<Ack> {
            self.record("update_profile", &update.username)?;
            if let Some(p) = self.profiles.borrow_mut().iter_mut().find(|p| p.username == update.username) {
                p.bio = Some(update.bio.clone());
            }
            Ok(Ack { status: Some(200), message: Some("Profile updated".to_string()) })
        }

        async fn follow(&self, uid: &str) -> ClientResult<FollowResponse> {
            self.record("follow", uid)?;
            Ok(self
                .follow_reply
                .borrow_mut()
                .take()
                .unwrap_or(FollowResponse { status: 201, following: None }))
        }
    }
}
