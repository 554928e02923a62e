use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::api::SocioApi;
use crate::auth::Redirect;
use crate::config::{comment_post_key, CommentPostKey, MAX_POST_LENGTH, NO_IMAGE};
use crate::core::helpers::{new_upid, now_iso};
use crate::core::notice::Notice;
use crate::models::models::{CommentRef, MetaData, NewComment, NewPost, NewPostBody, Post};
use crate::session::Session;
use crate::sync::{ExpandedSet, LikeToggle, PagedList, PendingDelete};

/// Identify a comment for the like/delete endpoints.
pub fn comment_ref(key: CommentPostKey, post: &Post, comment_id: &str) -> CommentRef {
    let post_id = match key {
        CommentPostKey::Upid if !post.upid.is_empty() => post.upid.clone(),
        _ => post.id.clone(),
    };
    CommentRef { post_id, comment_id: comment_id.to_string() }
}

/// Form actions posted from the feed page.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FeedAction {
    LoadMore,
    Like { post: String },
    ToggleLikers { post: String },
    ToggleComments { post: String },
    Comment { post: String, text: String },
    LikeComment { post: String, comment: String },
    ToggleCommentLikers { comment: String },
    DeleteComment { post: String, comment: String },
    RequestDelete { post: String },
    ConfirmDelete,
    CancelDelete,
}

/// State behind the paginated feed page of one session.
#[derive(Debug)]
pub struct FeedView {
    pub username: String,
    pub profile_picture: Option<String>,
    pub posts: PagedList<Post>,
    pub post_likers: ExpandedSet,
    pub comment_likers: ExpandedSet,
    pub threads: ExpandedSet,
    pub delete: PendingDelete,
    pub notice: Option<Notice>,
    comment_key: CommentPostKey,
}

impl FeedView {
    pub fn new(session: &Session, limit: usize) -> Self {
        FeedView {
            username: session.username.clone(),
            profile_picture: session.profile_picture.clone(),
            posts: PagedList::new(limit),
            post_likers: ExpandedSet::default(),
            comment_likers: ExpandedSet::default(),
            threads: ExpandedSet::default(),
            delete: PendingDelete::default(),
            notice: None,
            comment_key: comment_post_key(),
        }
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Fetch the page at the cursor's offset. Returns whether it succeeded;
    /// a failure leaves the loaded posts untouched.
    pub async fn load<A: SocioApi>(&mut self, api: &A) -> bool {
        let (limit, offset) = self.posts.begin_load();
        debug!(limit, offset, "loading feed page");
        let result = api.feed(limit, offset).await;
        self.posts.end_load();

        match result {
            Ok(page) => {
                self.posts.apply_page(offset, page.paginated_feed, page.total);
                self.prune_open_state();
                true
            }
            Err(err) => {
                error!(error = %err, offset, "error fetching feed");
                self.notice = Some(Notice::error("Failed to load feed"));
                false
            }
        }
    }

    /// Start over from the first page.
    pub async fn refresh<A: SocioApi>(&mut self, api: &A) {
        self.posts.reset();
        self.load(api).await;
    }

    pub async fn load_more<A: SocioApi>(&mut self, api: &A) {
        if !self.posts.cursor.has_more || self.posts.is_loading() {
            return;
        }
        self.posts.cursor.advance();
        if !self.load(api).await {
            // The same page is requested again on the next trigger
            let limit = self.posts.cursor.limit;
            self.posts.cursor.offset = self.posts.cursor.offset.saturating_sub(limit);
        }
    }

    /// Apply the current user's like toggle locally, before any request.
    pub fn begin_like(&mut self, post_id: &str) -> Option<LikeToggle> {
        let post = self.posts.get_mut(post_id)?;
        Some(LikeToggle::apply(post, &self.username))
    }

    pub async fn toggle_like<A: SocioApi>(&mut self, api: &A, post_id: &str) {
        let Some(toggle) = self.begin_like(post_id) else {
            warn!(post_id, "like on unknown post");
            return;
        };
        if let Err(err) = api.like_post(post_id).await {
            error!(error = %err, post_id, "error liking post");
            if let Some(post) = self.posts.get_mut(post_id) {
                toggle.rollback(post);
            }
            self.notice = Some(Notice::from_error(&err, "Failed to like post"));
        }
    }

    pub async fn toggle_comment_like<A: SocioApi>(&mut self, api: &A, post_id: &str, comment_id: &str) {
        let Some(post) = self.posts.get_mut(post_id) else {
            return;
        };
        let target = comment_ref(self.comment_key, post, comment_id);
        let Some(comment) = post.post.comments.iter_mut().find(|c| c.comment_id == comment_id) else {
            return;
        };
        let toggle = LikeToggle::apply(comment, &self.username);

        if let Err(err) = api.like_comment(&target).await {
            error!(error = %err, post_id, comment_id, "error liking comment");
            let comment = self
                .posts
                .get_mut(post_id)
                .and_then(|p| p.post.comments.iter_mut().find(|c| c.comment_id == comment_id));
            if let Some(comment) = comment {
                toggle.rollback(comment);
            }
            self.notice = Some(Notice::from_error(&err, "Failed to like comment"));
        }
    }

    pub fn toggle_likers(&mut self, post_id: &str) {
        self.post_likers.toggle(post_id);
    }

    pub fn toggle_comment_likers(&mut self, comment_id: &str) {
        self.comment_likers.toggle(comment_id);
    }

    pub fn toggle_thread(&mut self, post_id: &str) {
        self.threads.toggle(post_id);
    }

    /// Open the confirmation modal. Only the author may trash a post.
    pub fn request_delete(&mut self, post_id: &str) {
        match self.posts.get(post_id) {
            Some(post) if post.meta.author == self.username => self.delete.request(post_id),
            Some(_) => warn!(post_id, "refusing to trash someone else's post"),
            None => {}
        }
    }

    pub fn cancel_delete(&mut self) {
        self.delete.cancel();
    }

    /// Hide the post at once, then move it to the trash. Put back on failure.
    pub async fn confirm_delete<A: SocioApi>(&mut self, api: &A) {
        let Some(post_id) = self.delete.take() else {
            return;
        };
        let Some(index) = self.posts.keys().position(|k| k == post_id) else {
            return;
        };
        let Some(post) = self.posts.remove(&post_id) else {
            return;
        };

        if let Err(err) = api.trash_post(&post_id).await {
            error!(error = %err, post_id = %post_id, "error deleting post");
            self.posts.insert(index, post);
            self.notice = Some(Notice::from_error(&err, "Failed to delete post"));
        } else {
            self.prune_open_state();
        }
    }

    /// Post a comment then reload the feed from the top.
    pub async fn add_comment<A: SocioApi>(&mut self, api: &A, post_id: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let Some(post) = self.posts.get(post_id).cloned() else {
            return;
        };
        let body = NewComment {
            comment: text.to_string(),
            id: post.id.clone(),
            post,
            profile_pic: self.profile_picture.clone(),
        };

        match api.add_comment(&body).await {
            Ok(()) => {
                self.refresh(api).await;
                self.threads.open(post_id);
            }
            Err(err) => {
                error!(error = %err, post_id, "error adding comment");
                self.notice = Some(Notice::from_error(&err, "Failed to add comment"));
            }
        }
    }

    pub async fn delete_comment<A: SocioApi>(&mut self, api: &A, post_id: &str, comment_id: &str) {
        let Some(post) = self.posts.get(post_id) else {
            return;
        };
        let target = comment_ref(self.comment_key, post, comment_id);
        match api.delete_comment(&target).await {
            Ok(()) => self.refresh(api).await,
            Err(err) => {
                error!(error = %err, post_id, comment_id, "error deleting comment");
                self.notice = Some(Notice::from_error(&err, "Failed to delete comment"));
            }
        }
    }

    pub async fn dispatch<A: SocioApi>(&mut self, api: &A, action: FeedAction) {
        match action {
            FeedAction::LoadMore => self.load_more(api).await,
            FeedAction::Like { post } => self.toggle_like(api, &post).await,
            FeedAction::ToggleLikers { post } => self.toggle_likers(&post),
            FeedAction::ToggleComments { post } => self.toggle_thread(&post),
            FeedAction::Comment { post, text } => self.add_comment(api, &post, &text).await,
            FeedAction::LikeComment { post, comment } => {
                self.toggle_comment_like(api, &post, &comment).await
            }
            FeedAction::ToggleCommentLikers { comment } => self.toggle_comment_likers(&comment),
            FeedAction::DeleteComment { post, comment } => {
                self.delete_comment(api, &post, &comment).await
            }
            FeedAction::RequestDelete { post } => self.request_delete(&post),
            FeedAction::ConfirmDelete => self.confirm_delete(api).await,
            FeedAction::CancelDelete => self.cancel_delete(),
        }
    }

    fn prune_open_state(&mut self) {
        let posts = self.posts.items();
        self.post_likers.retain_known(posts.iter().map(|p| p.id.as_str()));
        self.threads.retain_known(posts.iter().map(|p| p.id.as_str()));
        self.comment_likers.retain_known(
            posts.iter().flat_map(|p| p.post.comments.iter().map(|c| c.comment_id.as_str())),
        );
    }
}

// === Composer ===

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PostForm {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
    /// Echoed back from the rendered form so retries keep one id.
    #[serde(default)]
    pub upid: Option<String>,
}

/// The "make a post" form. `upid` survives failed submits via a hidden field.
#[derive(Debug, Clone)]
pub struct PostComposer {
    pub upid: String,
    pub content: String,
    pub image: String,
    pub error: Option<String>,
}

impl Default for PostComposer {
    fn default() -> Self {
        PostComposer {
            upid: new_upid(),
            content: String::new(),
            image: NO_IMAGE.to_string(),
            error: None,
        }
    }
}

impl PostComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill(&mut self, form: &PostForm) {
        if let Some(upid) = form.upid.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            self.upid = upid.to_string();
        }
        self.content = form.content.clone();
        self.image = form
            .image
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or(NO_IMAGE)
            .to_string();
        self.error = None;
    }

    pub fn validate(&mut self) -> bool {
        let length = self.content.chars().count();
        self.error = if self.content.trim().is_empty() {
            Some("Post content is required".to_string())
        } else if length > MAX_POST_LENGTH {
            Some(format!("Post content cannot exceed {} characters", MAX_POST_LENGTH))
        } else {
            None
        };
        self.error.is_none()
    }

    pub fn build(&self, session: &Session) -> NewPost {
        NewPost {
            post: NewPostBody { content: self.content.trim().to_string(), likes: 0 },
            meta: MetaData {
                author: session.username.clone(),
                profile_picture: session.profile_picture.clone(),
                date: now_iso(),
            },
            upid: self.upid.clone(),
            post_img: self.image.clone(),
            comments: Vec::new(),
        }
    }

    /// Validate and create the post; on success the browser goes to the feed.
    pub async fn submit<A: SocioApi>(&mut self, api: &A, session: &Session) -> Result<Redirect, Notice> {
        if !self.validate() {
            return Err(Notice::error(self.error.clone().unwrap_or_default()));
        }

        match api.create_post(&self.build(session)).await {
            Ok(ack) if ack.message.is_some() => Ok(Redirect::new("/feed", 0)),
            Ok(_) => Err(Notice::error("Failed to create post")),
            Err(err) => {
                error!(error = %err, "post submission error");
                Err(Notice::from_error(&err, "Failed to create post. Please try again."))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{comment, post, FakeApi};

    fn session() -> Session {
        Session::new("tok", "ana")
    }

    fn seeded(n: usize) -> FakeApi {
        let api = FakeApi::new();
        *api.feed.borrow_mut() = (0..n).map(|i| post(&format!("p{}", i), "bo", &[])).collect();
        api
    }

    #[tokio::test]
    async fn like_shows_immediately_before_request_resolves() {
        let api = FakeApi::new();
        *api.feed.borrow_mut() = vec![post("p1", "bo", &["x", "y", "z"])];
        let mut feed = FeedView::new(&session(), 15);
        feed.load(&api).await;

        let toggle = feed.begin_like("p1").unwrap();
        assert!(toggle.now_liked());
        let p = feed.posts.get("p1").unwrap();
        assert_eq!(p.post.likes, 4);
        assert!(p.post.liked_by.iter().any(|l| l.username == "ana"));
        assert!(!api.called("like_post"));
    }

    #[tokio::test]
    async fn failed_like_is_rolled_back() {
        let api = FakeApi::new();
        *api.feed.borrow_mut() = vec![post("p1", "bo", &["x", "y", "z"])];
        api.fail("like_post");
        let mut feed = FeedView::new(&session(), 15);
        feed.load(&api).await;

        feed.toggle_like(&api, "p1").await;
        assert_eq!(feed.posts.get("p1").unwrap().post.likes, 3);
        assert_eq!(feed.take_notice().unwrap().message, "Failed to like post");
    }

    #[tokio::test]
    async fn successful_like_keeps_local_patch() {
        let api = FakeApi::new();
        *api.feed.borrow_mut() = vec![post("p1", "bo", &["ana"])];
        let mut feed = FeedView::new(&session(), 15);
        feed.load(&api).await;

        feed.toggle_like(&api, "p1").await;
        assert_eq!(feed.posts.get("p1").unwrap().post.likes, 0);
        assert_eq!(api.calls(), ["feed:0", "like_post:p1"]);
    }

    #[tokio::test]
    async fn second_page_appends_and_ends_pagination() {
        let api = seeded(20);
        let mut feed = FeedView::new(&session(), 15);
        feed.load(&api).await;
        assert_eq!(feed.posts.items().len(), 15);
        assert!(feed.posts.cursor.has_more);

        feed.load_more(&api).await;
        assert_eq!(feed.posts.items().len(), 20);
        assert_eq!(feed.posts.items()[15].id, "p15");
        assert!(!feed.posts.cursor.has_more);

        feed.load_more(&api).await;
        assert_eq!(api.calls(), ["feed:0", "feed:15"]);
    }

    #[tokio::test]
    async fn failed_page_keeps_state_and_retries_same_offset() {
        let api = seeded(30);
        let mut feed = FeedView::new(&session(), 15);
        feed.load(&api).await;
        api.fail("feed");

        feed.load_more(&api).await;
        assert_eq!(feed.posts.items().len(), 15);
        assert_eq!(feed.posts.cursor.offset, 0);
        assert!(!feed.posts.is_loading());
        assert_eq!(feed.take_notice(), Some(Notice::error("Failed to load feed")));
    }

    #[tokio::test]
    async fn confirmed_delete_removes_post() {
        let api = FakeApi::new();
        *api.feed.borrow_mut() = vec![post("p1", "ana", &[]), post("p2", "bo", &[])];
        let mut feed = FeedView::new(&session(), 15);
        feed.load(&api).await;

        feed.dispatch(&api, FeedAction::RequestDelete { post: "p1".into() }).await;
        assert_eq!(feed.delete.target(), Some("p1"));
        feed.dispatch(&api, FeedAction::ConfirmDelete).await;

        assert!(feed.posts.get("p1").is_none());
        assert_eq!(feed.delete.target(), None);
        assert!(api.called("trash_post"));
    }

    #[tokio::test]
    async fn cancel_and_foreign_posts_do_not_delete() {
        let api = FakeApi::new();
        *api.feed.borrow_mut() = vec![post("p1", "ana", &[]), post("p2", "bo", &[])];
        let mut feed = FeedView::new(&session(), 15);
        feed.load(&api).await;

        feed.request_delete("p2");
        assert_eq!(feed.delete.target(), None);

        feed.request_delete("p1");
        feed.cancel_delete();
        feed.confirm_delete(&api).await;
        assert_eq!(feed.posts.items().len(), 2);
        assert!(!api.called("trash_post"));
    }

    #[tokio::test]
    async fn failed_trash_puts_post_back_in_place() {
        let api = FakeApi::new();
        *api.feed.borrow_mut() = vec![post("p0", "bo", &[]), post("p1", "ana", &[])];
        api.fail("trash_post");
        let mut feed = FeedView::new(&session(), 15);
        feed.load(&api).await;

        feed.request_delete("p1");
        feed.confirm_delete(&api).await;
        assert_eq!(feed.posts.keys().collect::<Vec<_>>(), ["p0", "p1"]);
        assert_eq!(feed.take_notice().unwrap().message, "Failed to delete post");
    }

    #[tokio::test]
    async fn comment_reloads_from_first_page() {
        let api = seeded(20);
        let mut feed = FeedView::new(&session(), 15);
        feed.load(&api).await;
        feed.load_more(&api).await;

        feed.add_comment(&api, "p16", "  nice  ").await;
        assert!(api.called("add_comment"));
        assert_eq!(feed.posts.cursor.offset, 0);
        assert_eq!(feed.posts.items().len(), 15);
        assert_eq!(api.calls().last().map(String::as_str), Some("feed:0"));

        let before = api.calls().len();
        feed.add_comment(&api, "p1", "   ").await;
        assert_eq!(api.calls().len(), before);
    }

    #[tokio::test]
    async fn comment_like_is_optimistic_and_uses_upid() {
        let api = FakeApi::new();
        let mut p = post("p1", "bo", &[]);
        p.post.comments.push(comment("c1", "bo", &[]));
        *api.feed.borrow_mut() = vec![p];
        let mut feed = FeedView::new(&session(), 15);
        feed.comment_key = CommentPostKey::Upid;
        feed.load(&api).await;

        feed.dispatch(&api, FeedAction::LikeComment { post: "p1".into(), comment: "c1".into() }).await;
        let c = &feed.posts.get("p1").unwrap().post.comments[0];
        assert_eq!(c.liked_by.len(), 1);
        assert!(api.called("like_comment:up-p1/c1"));
    }

    #[tokio::test]
    async fn popovers_toggle_independently() {
        let api = seeded(2);
        let mut feed = FeedView::new(&session(), 15);
        feed.load(&api).await;

        feed.toggle_likers("p0");
        feed.toggle_thread("p1");
        assert!(feed.post_likers.is_open("p0"));
        assert!(!feed.threads.is_open("p0"));
        assert!(feed.threads.is_open("p1"));
        feed.toggle_likers("p0");
        assert!(feed.post_likers.is_empty());
    }

    #[tokio::test]
    async fn deleted_comment_is_gone_after_refetch() {
        let api = FakeApi::new();
        let mut p = post("p1", "bo", &[]);
        p.post.comments = vec![comment("c1", "ana", &[]), comment("c2", "bo", &[])];
        *api.feed.borrow_mut() = vec![p];
        let mut feed = FeedView::new(&session(), 15);
        feed.comment_key = CommentPostKey::Upid;
        feed.load(&api).await;

        let action: FeedAction = serde_json::from_value(
            serde_json::json!({"action": "delete_comment", "post": "p1", "comment": "c1"}),
        )
        .unwrap();
        feed.dispatch(&api, action).await;

        assert_eq!(api.calls(), ["feed:0", "delete_comment:up-p1/c1", "feed:0"]);
        let comments = &feed.posts.get("p1").unwrap().post.comments;
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].comment_id, "c2");
        assert_eq!(feed.take_notice(), None);
    }

    #[tokio::test]
    async fn failed_comment_delete_keeps_comment() {
        let api = FakeApi::new();
        let mut p = post("p1", "bo", &[]);
        p.post.comments = vec![comment("c1", "ana", &[])];
        *api.feed.borrow_mut() = vec![p];
        api.fail("delete_comment");
        let mut feed = FeedView::new(&session(), 15);
        feed.load(&api).await;

        feed.delete_comment(&api, "p1", "c1").await;
        assert_eq!(feed.posts.get("p1").unwrap().post.comments.len(), 1);
        assert_eq!(feed.take_notice().unwrap().message, "Failed to delete comment");
        assert_eq!(api.calls().last().map(String::as_str), Some("delete_comment:up-p1/c1"));
    }

    #[test]
    fn feed_actions_parse_from_form_fields() {
        let action: FeedAction =
            serde_json::from_value(serde_json::json!({"action": "like_comment", "post": "p", "comment": "c"}))
                .unwrap();
        assert_eq!(action, FeedAction::LikeComment { post: "p".into(), comment: "c".into() });
    }

    #[test]
    fn composer_validates_length() {
        let mut composer = PostComposer::new();
        composer.fill(&PostForm { content: "   ".into(), image: None, upid: None });
        assert!(!composer.validate());
        assert_eq!(composer.error.as_deref(), Some("Post content is required"));

        composer.fill(&PostForm { content: "a".repeat(501), image: None, upid: None });
        assert!(!composer.validate());

        composer.fill(&PostForm { content: "a".repeat(500), image: Some(" ".into()), upid: None });
        assert!(composer.validate());
        assert_eq!(composer.image, "none");
    }

    #[tokio::test]
    async fn composer_submits_with_session_author() {
        let api = FakeApi::new();
        let mut composer = PostComposer::new();
        composer.fill(&PostForm {
            content: " hello ".into(),
            image: Some("img1".into()),
            upid: Some("up-fixed".into()),
        });

        let redirect = composer.submit(&api, &session()).await.unwrap();
        assert_eq!(redirect.to, "/feed");
        let built = composer.build(&session());
        assert_eq!(built.post.content, "hello");
        assert_eq!(built.meta.author, "ana");
        assert_eq!(built.post_img, "img1");
        assert!(api.called("create_post:up-fixed"));
    }
}
