use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::api::SocioApi;
use crate::config::{comment_post_key, CommentPostKey};
use crate::core::notice::Notice;
use crate::follow::{is_following, toggle_follow};
use crate::models::models::{NewComment, Person, Post, Profile, ProfileUpdate};
use crate::posts::comment_ref;
use crate::session::Session;
use crate::sync::{find_mut, ExpandedSet, Keyed, LikeToggle};

// === People directory ===

pub const NO_PEOPLE: &str = "No people found";
pub const NO_PEOPLE_DETAIL: &str = "It seems there's no one to connect with right now.";

#[derive(Debug, Clone)]
pub struct PersonCard<'a> {
    pub person: &'a Person,
    pub badge: Option<&'static str>,
}

#[derive(Debug, Default)]
pub struct PeopleView {
    pub people: Vec<Person>,
    pub viewer: Option<Profile>,
    pub loading: bool,
    pub error: Option<String>,
    pub notice: Option<Notice>,
}

impl PeopleView {
    pub fn new() -> Self {
        PeopleView { loading: true, ..Default::default() }
    }

    pub async fn load<A: SocioApi>(&mut self, api: &A, session: &Session) {
        self.loading = true;
        self.error = None;

        let result = async {
            let people = api.people().await?;
            let viewer = api.person(&session.username).await?;
            Ok::<_, crate::core::errors::ClientError>((people, viewer))
        }
        .await;
        self.loading = false;

        match result {
            Ok((people, viewer)) => {
                debug!(count = people.len(), "people loaded");
                self.people = people;
                self.viewer = Some(viewer);
            }
            Err(err) => {
                error!(error = %err, "error fetching people");
                let message = err.notice_text("Failed to load data");
                self.notice = Some(Notice::error(message.clone()));
                self.error = Some(message);
            }
        }
    }

    /// `None` while there is something to show; the empty-state text otherwise.
    pub fn empty_state(&self) -> Option<(&'static str, &'static str)> {
        (!self.loading && self.error.is_none() && self.people.is_empty())
            .then_some((NO_PEOPLE, NO_PEOPLE_DETAIL))
    }

    pub fn cards(&self) -> Vec<PersonCard<'_>> {
        self.people
            .iter()
            .map(|person| PersonCard { person, badge: self.badge_for(person) })
            .collect()
    }

    fn badge_for(&self, person: &Person) -> Option<&'static str> {
        let viewer = self.viewer.as_ref()?;
        let theirs = person.category_pref.first()?;
        if viewer.category_pref.first() != Some(theirs) {
            return None;
        }
        if person.username == viewer.username {
            Some("It's You!")
        } else {
            Some("Just Like You!")
        }
    }
}

// === Profile page ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileTab {
    #[default]
    Posts,
    Trash,
}

/// Form actions posted from a profile page.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProfileAction {
    Like { post: String },
    ToggleLikers { post: String },
    ToggleComments { post: String },
    Comment { post: String, text: String },
    LikeComment { post: String, comment: String },
    ToggleCommentLikers { comment: String },
    DeleteComment { post: String, comment: String },
    Trash { post: String },
    DeletePermanently { post: String },
    Restore { post: String },
    Follow,
    ToggleFollowers,
    ToggleFollowing,
    ShowPosts,
    ShowTrash,
    Edit,
    CancelEdit,
    UpdateBio { bio: String },
}

#[derive(Debug)]
pub struct ProfileView {
    pub username: String,
    pub viewer: String,
    pub viewer_picture: Option<String>,
    pub profile: Option<Profile>,
    pub posts: Vec<Post>,
    pub trash: Vec<Post>,
    pub tab: ProfileTab,
    pub is_following: bool,
    pub followers_open: bool,
    pub following_open: bool,
    pub editing: bool,
    pub loading: bool,
    pub post_likers: ExpandedSet,
    pub comment_likers: ExpandedSet,
    pub threads: ExpandedSet,
    pub notice: Option<Notice>,
    comment_key: CommentPostKey,
}

impl ProfileView {
    pub fn new(session: &Session, username: &str) -> Self {
        ProfileView {
            username: username.to_string(),
            viewer: session.username.clone(),
            viewer_picture: session.profile_picture.clone(),
            profile: None,
            posts: Vec::new(),
            trash: Vec::new(),
            tab: ProfileTab::Posts,
            is_following: false,
            followers_open: false,
            following_open: false,
            editing: false,
            loading: false,
            post_likers: ExpandedSet::default(),
            comment_likers: ExpandedSet::default(),
            threads: ExpandedSet::default(),
            notice: None,
            comment_key: comment_post_key(),
        }
    }

    pub fn is_own(&self) -> bool {
        self.username == self.viewer
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Posts for the active tab.
    pub fn visible(&self) -> &[Post] {
        match self.tab {
            ProfileTab::Posts => &self.posts,
            ProfileTab::Trash => &self.trash,
        }
    }

    /// Profile and posts fetched together; the trash only for one's own page.
    pub async fn load<A: SocioApi>(&mut self, api: &A) {
        self.loading = true;
        let (person, posts) = tokio::join!(api.person(&self.username), api.user_posts(&self.username));

        let result = match (person, posts) {
            (Ok(person), Ok(posts)) => {
                let trash = if self.is_own() { api.trash().await } else { Ok(Vec::new()) };
                trash.map(|trash| (person, posts, trash))
            }
            (Err(err), _) | (_, Err(err)) => Err(err),
        };
        self.loading = false;

        match result {
            Ok((person, posts, trash)) => {
                self.is_following = is_following(&person, &self.viewer);
                self.profile = Some(person);
                self.posts = posts;
                self.trash = trash;
                self.prune_open_state();
            }
            Err(err) => {
                error!(error = %err, username = %self.username, "profile data error");
                self.notice = Some(Notice::error("Failed to load profile data"));
            }
        }
    }

    fn find_post(&mut self, post_id: &str) -> Option<&mut Post> {
        if self.posts.iter().any(|p| p.key() == post_id) {
            find_mut(&mut self.posts, post_id)
        } else {
            find_mut(&mut self.trash, post_id)
        }
    }

    pub async fn toggle_like<A: SocioApi>(&mut self, api: &A, post_id: &str) {
        let viewer = self.viewer.clone();
        let Some(post) = self.find_post(post_id) else {
            return;
        };
        let toggle = LikeToggle::apply(post, &viewer);

        if let Err(err) = api.like_post(post_id).await {
            error!(error = %err, post_id, "like post error");
            if let Some(post) = self.find_post(post_id) {
                toggle.rollback(post);
            }
            self.notice = Some(Notice::from_error(&err, "Failed to like post"));
        }
    }

    pub async fn toggle_comment_like<A: SocioApi>(&mut self, api: &A, post_id: &str, comment_id: &str) {
        let viewer = self.viewer.clone();
        let key = self.comment_key;
        let Some(post) = self.find_post(post_id) else {
            return;
        };
        let target = comment_ref(key, post, comment_id);
        let Some(comment) = find_mut(&mut post.post.comments, comment_id) else {
            return;
        };
        let toggle = LikeToggle::apply(comment, &viewer);

        if let Err(err) = api.like_comment(&target).await {
            error!(error = %err, post_id, comment_id, "like comment error");
            if let Some(comment) = self
                .find_post(post_id)
                .and_then(|p| find_mut(&mut p.post.comments, comment_id))
            {
                toggle.rollback(comment);
            }
            self.notice = Some(Notice::from_error(&err, "Failed to like comment"));
        }
    }

    /// Move one of the viewer's posts to the trash. No confirmation step here.
    pub async fn trash_post<A: SocioApi>(&mut self, api: &A, post_id: &str) {
        if !self.is_own() {
            warn!(post_id, "trash requested on someone else's profile");
            return;
        }
        match api.trash_post(post_id).await {
            Ok(()) => self.load(api).await,
            Err(err) => {
                error!(error = %err, post_id, "delete post error");
                self.notice = Some(Notice::from_error(&err, "Failed to delete post"));
            }
        }
    }

    pub async fn delete_permanently<A: SocioApi>(&mut self, api: &A, post_id: &str) {
        let Some(idx) = self.trash.iter().position(|p| p.id == post_id) else {
            return;
        };
        let removed = self.trash.remove(idx);
        match api.delete_permanently(post_id).await {
            Ok(()) => self.load(api).await,
            Err(err) => {
                error!(error = %err, post_id, "permanent delete error");
                self.trash.insert(idx, removed);
                self.notice = Some(Notice::from_error(&err, "Failed to permanently delete post"));
            }
        }
    }

    pub async fn restore<A: SocioApi>(&mut self, api: &A, post_id: &str) {
        let Some(idx) = self.trash.iter().position(|p| p.id == post_id) else {
            return;
        };
        let removed = self.trash.remove(idx);
        match api.restore_post(post_id).await {
            Ok(()) => {
                self.notice = Some(Notice::success("Post restored"));
                self.load(api).await;
            }
            Err(err) => {
                error!(error = %err, post_id, "restore error");
                self.trash.insert(idx, removed);
                self.notice = Some(Notice::from_error(&err, "Failed to restore post"));
            }
        }
    }

    pub async fn add_comment<A: SocioApi>(&mut self, api: &A, post_id: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let Some(post) = self.find_post(post_id).map(|p| p.clone()) else {
            return;
        };
        let body = NewComment {
            comment: text.to_string(),
            id: post.id.clone(),
            post,
            profile_pic: self.viewer_picture.clone(),
        };
        match api.add_comment(&body).await {
            Ok(()) => {
                self.load(api).await;
                self.threads.open(post_id);
            }
            Err(err) => {
                error!(error = %err, post_id, "add comment error");
                self.notice = Some(Notice::from_error(&err, "Failed to add comment"));
            }
        }
    }

    pub async fn delete_comment<A: SocioApi>(&mut self, api: &A, post_id: &str, comment_id: &str) {
        let key = self.comment_key;
        let Some(target) = self.find_post(post_id).map(|p| comment_ref(key, p, comment_id)) else {
            return;
        };
        match api.delete_comment(&target).await {
            Ok(()) => self.load(api).await,
            Err(err) => {
                error!(error = %err, post_id, comment_id, "delete comment error");
                self.notice = Some(Notice::from_error(&err, "Failed to delete comment"));
            }
        }
    }

    pub async fn follow<A: SocioApi>(&mut self, api: &A) {
        let Some(profile) = self.profile.as_ref() else {
            return;
        };
        match toggle_follow(api, &self.viewer, profile).await {
            Ok(following) => self.is_following = following,
            Err(err) => {
                self.notice = Some(Notice::from_error(&err, "Failed to update follow status"));
            }
        }
    }

    pub async fn update_bio<A: SocioApi>(&mut self, api: &A, bio: &str) {
        if !self.is_own() {
            return;
        }
        let update = ProfileUpdate { username: self.username.clone(), bio: bio.trim().to_string() };
        match api.update_profile(&update).await {
            Ok(ack) if ack.status == Some(200) => {
                self.editing = false;
                self.notice = Some(Notice::success(ack.message.unwrap_or_else(|| "Profile updated".to_string())));
                self.load(api).await;
            }
            Ok(ack) => {
                self.notice = Some(Notice::error(ack.message.unwrap_or_else(|| "Failed to update profile".to_string())));
            }
            Err(err) => {
                error!(error = %err, "profile update error");
                self.notice = Some(Notice::from_error(&err, "Failed to update profile"));
            }
        }
    }

    pub fn show_tab(&mut self, tab: ProfileTab) {
        self.tab = if self.is_own() { tab } else { ProfileTab::Posts };
    }

    pub async fn dispatch<A: SocioApi>(&mut self, api: &A, action: ProfileAction) {
        match action {
            ProfileAction::Like { post } => self.toggle_like(api, &post).await,
            ProfileAction::ToggleLikers { post } => {
                self.post_likers.toggle(&post);
            }
            ProfileAction::ToggleComments { post } => {
                self.threads.toggle(&post);
            }
            ProfileAction::Comment { post, text } => self.add_comment(api, &post, &text).await,
            ProfileAction::LikeComment { post, comment } => {
                self.toggle_comment_like(api, &post, &comment).await
            }
            ProfileAction::ToggleCommentLikers { comment } => {
                self.comment_likers.toggle(&comment);
            }
            ProfileAction::DeleteComment { post, comment } => {
                self.delete_comment(api, &post, &comment).await
            }
            ProfileAction::Trash { post } => self.trash_post(api, &post).await,
            ProfileAction::DeletePermanently { post } => self.delete_permanently(api, &post).await,
            ProfileAction::Restore { post } => self.restore(api, &post).await,
            ProfileAction::Follow => self.follow(api).await,
            ProfileAction::ToggleFollowers => self.followers_open = !self.followers_open,
            ProfileAction::ToggleFollowing => self.following_open = !self.following_open,
            ProfileAction::ShowPosts => self.show_tab(ProfileTab::Posts),
            ProfileAction::ShowTrash => self.show_tab(ProfileTab::Trash),
            ProfileAction::Edit => self.editing = self.is_own(),
            ProfileAction::CancelEdit => self.editing = false,
            ProfileAction::UpdateBio { bio } => self.update_bio(api, &bio).await,
        }
    }

    fn prune_open_state(&mut self) {
        let post_ids: Vec<String> = self.posts.iter().chain(&self.trash).map(|p| p.id.clone()).collect();
        let comment_ids: Vec<String> = self
            .posts
            .iter()
            .chain(&self.trash)
            .flat_map(|p| p.post.comments.iter().map(|c| c.comment_id.clone()))
            .collect();
        self.post_likers.retain_known(post_ids.iter().map(String::as_str));
        self.threads.retain_known(post_ids.iter().map(String::as_str));
        self.comment_likers.retain_known(comment_ids.iter().map(String::as_str));
    }
}
