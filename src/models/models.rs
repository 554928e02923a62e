use serde::{Serialize, Deserialize};

/// Someone who liked a post or a comment.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Liker {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, rename = "profilePicture", skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

impl Liker {
    pub fn named(username: &str) -> Self {
        Liker {
            username: username.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Comment {
    pub comment_id: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default, rename = "commentBy")]
    pub comment_by: Option<String>,
    #[serde(default, rename = "profilePicC")]
    pub profile_pic: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default, rename = "likedBy")]
    pub liked_by: Vec<Liker>,
}

impl Comment {
    pub fn author(&self) -> &str {
        self.comment_by.as_deref().filter(|a| !a.is_empty()).unwrap_or("Unknown")
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PostBody {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default, rename = "likedBy")]
    pub liked_by: Vec<Liker>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct MetaData {
    #[serde(default)]
    pub author: String,
    #[serde(default, rename = "profilePicture")]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub date: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub upid: String,
    #[serde(default)]
    pub post: PostBody,
    #[serde(default, rename = "metaData")]
    pub meta: MetaData,
    #[serde(default, rename = "postImg")]
    pub post_img: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Directory entry, also used for follower/following lists.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Person {
    pub username: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default, rename = "profilePicture")]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub category_pref: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Profile {
    pub username: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default, rename = "profilePicture")]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub category_pref: Vec<String>,
    #[serde(default)]
    pub followers: Vec<Person>,
    #[serde(default)]
    pub following: Vec<Person>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct FeedPage {
    #[serde(default, rename = "paginatedFeed")]
    pub paginated_feed: Vec<Post>,
    #[serde(default)]
    pub total: u64,
}

// === Request bodies ===

#[derive(Serialize, Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// `message` is a string on success and a numeric error code on failure.
#[derive(Deserialize, Debug, Default)]
pub struct SignupResponse {
    #[serde(default)]
    pub message: serde_json::Value,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct NewPostBody {
    pub content: String,
    pub likes: u64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NewPost {
    pub post: NewPostBody,
    #[serde(rename = "metaData")]
    pub meta: MetaData,
    pub upid: String,
    #[serde(rename = "postImg")]
    pub post_img: String,
    pub comments: Vec<Comment>,
}

#[derive(Serialize, Clone, Debug)]
pub struct NewComment {
    pub comment: String,
    pub id: String,
    pub post: Post,
    #[serde(rename = "profilePicC", skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CommentRef {
    pub post_id: String,
    pub comment_id: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ProfileUpdate {
    pub username: String,
    pub bio: String,
}

/// Generic `{ status?, message? }` acknowledgement.
#[derive(Deserialize, Debug, Default)]
pub struct Ack {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct FollowBody {
    #[serde(default)]
    pub following: Option<bool>,
}

/// Follow round trip: the HTTP status plus whatever body came back.
#[derive(Debug)]
pub struct FollowResponse {
    pub status: u16,
    pub following: Option<bool>,
}

impl FollowResponse {
    /// Explicit payload wins; older backends only signal via `201 Created`.
    pub fn is_following(&self) -> bool {
        self.following.unwrap_or(self.status == 201)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn post_reads_backend_shape() {
        let raw = json!({
            "_id": "p1",
            "upid": "u1",
            "post": {
                "content": "hello",
                "likes": 1,
                "likedBy": [{"username": "ana", "uid": "7"}],
                "comments": [{"comment_id": "c1", "comment": "hi", "commentBy": "bo", "date": "2024-01-01T00:00:00Z", "likedBy": []}]
            },
            "metaData": {"author": "ana", "profilePicture": "pic", "date": "2024-01-01T00:00:00Z"},
            "postImg": "none",
            "category": "Tech"
        });
        let post: Post = serde_json::from_value(raw).unwrap();
        assert_eq!(post.id, "p1");
        assert_eq!(post.post.liked_by[0].uid.as_deref(), Some("7"));
        assert_eq!(post.post.comments[0].author(), "bo");
        assert_eq!(post.meta.profile_picture.as_deref(), Some("pic"));
    }

    #[test]
    fn missing_fields_default() {
        let post: Post = serde_json::from_value(json!({"_id": "p2"})).unwrap();
        assert_eq!(post.post.likes, 0);
        assert!(post.post.comments.is_empty());
        let comment: Comment = serde_json::from_value(json!({"comment_id": "c"})).unwrap();
        assert_eq!(comment.author(), "Unknown");
    }

    #[test]
    fn follow_prefers_payload_over_status() {
        let explicit = FollowResponse { status: 201, following: Some(false) };
        assert!(!explicit.is_following());
        let legacy = FollowResponse { status: 201, following: None };
        assert!(legacy.is_following());
        let legacy_off = FollowResponse { status: 200, following: None };
        assert!(!legacy_off.is_following());
    }
}
