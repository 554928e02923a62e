use std::sync::OnceLock;

use ammonia::Builder;
use chrono::{DateTime, Utc};
use html_escape::{decode_html_entities, encode_double_quoted_attribute, encode_text};
use regex::Regex;

use crate::auth::{LoginForm, Redirect, SignupForm};
use crate::config::MAX_POST_LENGTH;
use crate::core::helpers::{avatar_url, image_url, time_ago};
use crate::core::notice::Notice;
use crate::core::static_server::asset_text;
use crate::follow::{followers, followings};
use crate::models::models::{Comment, Liker, Person, Post};
use crate::posts::{FeedView, PostComposer};
use crate::session::Session;
use crate::sync::{ExpandedSet, Likeable};
use crate::users::{PeopleView, ProfileTab, ProfileView};

/// One full HTML page around a rendered body.
pub struct Page<'a> {
    pub title: &'a str,
    pub session: Option<&'a Session>,
    pub notice: Option<Notice>,
    pub redirect: Option<&'a Redirect>,
    pub body: String,
}

impl<'a> Page<'a> {
    pub fn new(title: &'a str, session: Option<&'a Session>, body: String) -> Self {
        Page { title, session, notice: None, redirect: None, body }
    }

    pub fn notice(mut self, notice: Option<Notice>) -> Self {
        self.notice = notice;
        self
    }

    pub fn redirect(mut self, redirect: Option<&'a Redirect>) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn render(self) -> anyhow::Result<String> {
        let layout = asset_text("layout.html")?;

        let refresh = self
            .redirect
            .map(|r| {
                format!(
                    r#"<meta http-equiv="refresh" content="{};url={}">"#,
                    r.after.as_secs_f64(),
                    encode_double_quoted_attribute(&r.to),
                )
            })
            .unwrap_or_default();
        let notice = self
            .notice
            .map(|n| {
                format!(
                    r#"<div class="toast {}" role="status">{}</div>"#,
                    n.kind.css_class(),
                    encode_text(&n.message)
                )
            })
            .unwrap_or_default();

        let title = encode_text(self.title);
        let nav = nav(self.session);
        // One pass, so inserted text is never scanned for placeholders
        let page = placeholder_regex().replace_all(&layout, |caps: &regex::Captures| {
            let value: &str = match &caps[1] {
                "REFRESH" => &refresh,
                "TITLE" => &title,
                "NAV" => &nav,
                "NOTICE" => &notice,
                _ => &self.body,
            };
            value.to_string()
        });
        Ok(page.into_owned())
    }
}

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"PAGE_(REFRESH|TITLE|NAV|NOTICE|BODY)").expect("Regex should compile")
    })
}

fn nav(session: Option<&Session>) -> String {
    match session {
        Some(s) => format!(
            r#"<a href="/feed">Feed</a><a href="/people">People</a><a href="/post">Post</a><a href="{}"><img class="avatar" src="{}" alt=""> {}</a><a href="/logout">Logout</a>"#,
            profile_href(&s.username),
            encode_double_quoted_attribute(&avatar_url(s.profile_picture.as_deref())),
            encode_text(&s.username),
        ),
        None => r#"<a href="/login">Login</a><a href="/signup">Sign up</a>"#.to_string(),
    }
}

// === Content filtering ===

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"https?://[^\s<]+").expect("Regex should compile"))
}

/// Strip all markup from user text, then turn bare URLs into links.
pub fn filter_post_content(content: &str) -> String {
    let clean = Builder::default()
        .tags(std::collections::HashSet::new())
        .clean(content)
        .to_string();

    url_regex()
        .replace_all(&clean, |caps: &regex::Captures| {
            let shown = &caps[0];
            let href = decode_html_entities(shown);
            format!(
                r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
                encode_double_quoted_attribute(&href),
                shown
            )
        })
        .to_string()
}

fn profile_href(username: &str) -> String {
    format!("/profile/{}", urlencoding::encode(username))
}

fn user_link(username: &str, picture: Option<&str>) -> String {
    format!(
        r#"<a href="{}"><img class="avatar" src="{}" alt=""> {}</a>"#,
        profile_href(username),
        encode_double_quoted_attribute(&avatar_url(picture)),
        encode_text(username),
    )
}

/// A single-button form posting `action` plus hidden fields to `target`.
fn action_button(target: &str, action: &str, fields: &[(&str, &str)], label: &str, class: &str) -> String {
    let hidden: String = fields
        .iter()
        .map(|(name, value)| {
            format!(
                r#"<input type="hidden" name="{}" value="{}">"#,
                name,
                encode_double_quoted_attribute(value)
            )
        })
        .collect();
    format!(
        r#"<form method="post" action="{}"><input type="hidden" name="action" value="{}">{}<button class="{}" type="submit">{}</button></form>"#,
        encode_double_quoted_attribute(target),
        action,
        hidden,
        class,
        encode_text(label),
    )
}

fn likers_list(likers: &[Liker]) -> String {
    if likers.is_empty() {
        return r#"<div class="popover">No one :(</div>"#.to_string();
    }
    let items: String = likers
        .iter()
        .map(|l| format!("<li>{}</li>", user_link(&l.username, l.profile_picture.as_deref())))
        .collect();
    format!(r#"<div class="popover"><ul>{}</ul></div>"#, items)
}

fn people_list(people: &[Person]) -> String {
    if people.is_empty() {
        return r#"<div class="popover">No one yet</div>"#.to_string();
    }
    let items: String = people
        .iter()
        .map(|p| format!("<li>{}</li>", user_link(&p.username, p.profile_picture.as_deref())))
        .collect();
    format!(r#"<div class="popover"><ul>{}</ul></div>"#, items)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{} {}", n, one)
    } else {
        format!("{} {}", n, many)
    }
}

// === Post cards (shared by feed and profile) ===

/// What a post card needs from the page that hosts it.
struct PostCard<'a> {
    target: &'a str,
    viewer: &'a str,
    post_likers: &'a ExpandedSet,
    comment_likers: &'a ExpandedSet,
    threads: &'a ExpandedSet,
    now: DateTime<Utc>,
    /// Buttons for the owner: `(action, label, class)`.
    owner_actions: &'a [(&'a str, &'a str, &'a str)],
}

impl PostCard<'_> {
    fn render(&self, post: &Post) -> String {
        let id = post.id.as_str();
        let liked = post.is_liked_by(self.viewer);
        let mut html = String::from(r#"<article class="card">"#);

        html.push_str(&format!(
            r#"<div class="meta">{} · {}</div>"#,
            user_link(&post.meta.author, post.meta.profile_picture.as_deref()),
            encode_text(&time_ago(&post.meta.date, self.now)),
        ));
        if let Some(category) = post.category.as_deref().filter(|c| !c.is_empty()) {
            html.push_str(&format!(r#"<span class="badge">{}</span>"#, encode_text(category)));
        }
        html.push_str(&format!(
            r#"<p style="white-space: pre-wrap">{}</p>"#,
            filter_post_content(&post.post.content)
        ));
        if let Some(src) = image_url(post.post_img.as_deref()) {
            html.push_str(&format!(
                r#"<img class="post-img" src="{}" alt="Post content">"#,
                encode_double_quoted_attribute(&src)
            ));
        }

        html.push_str(r#"<div class="actions">"#);
        html.push_str(&action_button(
            self.target,
            "like",
            &[("post", id)],
            if liked { "♥ Unlike" } else { "♡ Like" },
            "plain",
        ));
        html.push_str(&action_button(
            self.target,
            "toggle_likers",
            &[("post", id)],
            &plural(post.post.likes as usize, "like", "likes"),
            "plain",
        ));
        html.push_str(&action_button(
            self.target,
            "toggle_comments",
            &[("post", id)],
            &plural(post.post.comments.len(), "Comment", "Comments"),
            "plain",
        ));
        if post.meta.author == self.viewer {
            for (action, label, class) in self.owner_actions {
                html.push_str(&action_button(self.target, action, &[("post", id)], label, class));
            }
        }
        html.push_str("</div>");

        if self.post_likers.is_open(id) {
            html.push_str(&likers_list(post.likers()));
        }
        if self.threads.is_open(id) {
            html.push_str(&self.thread(post));
        }
        html.push_str("</article>");
        html
    }

    fn thread(&self, post: &Post) -> String {
        let id = post.id.as_str();
        let mut html = String::from(r#"<section class="popover">"#);

        if post.post.comments.is_empty() {
            html.push_str("<p>No comments</p>");
        }
        for comment in &post.post.comments {
            html.push_str(&self.comment(id, comment));
        }

        html.push_str(&format!(
            r#"<form method="post" action="{}"><input type="hidden" name="action" value="comment"><input type="hidden" name="post" value="{}"><textarea name="text" rows="1" required placeholder="Make a Comment"></textarea><button type="submit">Comment</button></form>"#,
            encode_double_quoted_attribute(self.target),
            encode_double_quoted_attribute(id),
        ));
        html.push_str("</section>");
        html
    }

    fn comment(&self, post_id: &str, comment: &Comment) -> String {
        let cid = comment.comment_id.as_str();
        let liked = comment.is_liked_by(self.viewer);
        let mut html = format!(
            r#"<div class="comment"><div class="meta">{}</div><p style="white-space: pre-wrap">{}</p><div class="actions">"#,
            user_link(comment.author(), comment.profile_pic.as_deref()),
            filter_post_content(&comment.comment),
        );
        html.push_str(&action_button(
            self.target,
            "like_comment",
            &[("post", post_id), ("comment", cid)],
            if liked { "♥" } else { "♡" },
            "plain",
        ));
        html.push_str(&action_button(
            self.target,
            "toggle_comment_likers",
            &[("comment", cid)],
            &plural(comment.liked_by.len(), "like", "likes"),
            "plain",
        ));
        if comment.author() == self.viewer {
            html.push_str(&action_button(
                self.target,
                "delete_comment",
                &[("post", post_id), ("comment", cid)],
                "Delete",
                "plain",
            ));
        }
        html.push_str("</div>");
        if self.comment_likers.is_open(cid) {
            html.push_str(&likers_list(comment.likers()));
        }
        html.push_str("</div>");
        html
    }
}

// === Pages ===

struct Feature {
    title: &'static str,
    content: &'static str,
    highlight: &'static str,
    link: &'static str,
    auth_required: bool,
}

const FEATURES: [Feature; 3] = [
    Feature {
        title: "Make new Friends!",
        content: "Connect with people that are",
        highlight: "Just Like You",
        link: "/people",
        auth_required: true,
    },
    Feature {
        title: "Make a Post!",
        content: "Share your thoughts",
        highlight: "With Your Community",
        link: "/post",
        auth_required: true,
    },
    Feature {
        title: "Explore Feed",
        content: "Discover content",
        highlight: "You'll Love",
        link: "/feed",
        auth_required: false,
    },
];

pub fn home_body(session: Option<&Session>) -> String {
    let (cta, cta_label) = match session {
        Some(_) => ("/feed", "Go to Dashboard"),
        None => ("/login", "Get Started"),
    };
    let mut html = format!(
        r#"<section class="card"><h1>Connect with your perfect community</h1><p>Join thousands who've found meaningful connections through our platform</p><a class="button" href="{}">{}</a></section>"#,
        cta, cta_label
    );
    for feature in &FEATURES {
        let link = if feature.auth_required && session.is_none() { "/login" } else { feature.link };
        html.push_str(&format!(
            r#"<section class="card"><h2>{}</h2><p>{} <strong>{}</strong></p><a class="button" href="{}">Go</a></section>"#,
            feature.title, feature.content, feature.highlight, link
        ));
    }
    html
}

pub fn login_body(form: &LoginForm) -> String {
    format!(
        r#"<section class="card"><h1>Login</h1><form method="post" action="/login"><input name="username" placeholder="Username" value="{}" required><input name="password" type="password" placeholder="Password" required><button type="submit">Login</button></form><p class="meta">No account? <a href="/signup">Sign up</a></p></section>"#,
        encode_double_quoted_attribute(&form.username)
    )
}

pub fn signup_body(form: &SignupForm) -> String {
    format!(
        r#"<section class="card"><h1>Sign up</h1><form method="post" action="/signup"><input name="username" placeholder="Username" value="{}" required><input name="password" type="password" placeholder="Password" required><label><input type="checkbox" name="agree"{}>I agree to the Terms &amp; Conditions</label><button type="submit">Sign up</button></form><p class="meta">Already a member? <a href="/login">Login</a></p></section>"#,
        encode_double_quoted_attribute(&form.username),
        if form.agrees() { " checked" } else { "" },
    )
}

pub fn feed_body(view: &FeedView, now: DateTime<Utc>) -> String {
    let mut html = String::from(r#"<h1>Feed</h1><p><a class="button" href="/post">+ New Post</a></p>"#);

    if view.delete.target().is_some() {
        html.push_str(&format!(
            r#"<div class="modal"><div class="card"><h3>Delete Post</h3><p>Are you sure you want to delete this post? This action cannot be undone.</p><div class="actions">{}{}</div></div></div>"#,
            action_button("/feed", "cancel_delete", &[], "Cancel", "plain"),
            action_button("/feed", "confirm_delete", &[], "Delete", "danger"),
        ));
    }

    let posts = view.posts.items();
    if posts.is_empty() {
        if view.posts.loaded_once() && !view.posts.is_loading() {
            html.push_str(r#"<div class="empty"><h3>No Posts Found</h3><p>It seems quiet here. Be the first to share something!</p><a class="button" href="/post">Create New Post</a></div>"#);
        }
        return html;
    }

    let card = PostCard {
        target: "/feed",
        viewer: &view.username,
        post_likers: &view.post_likers,
        comment_likers: &view.comment_likers,
        threads: &view.threads,
        now,
        owner_actions: &[("request_delete", "Delete", "plain")],
    };
    for post in posts {
        html.push_str(&card.render(post));
    }

    if view.posts.cursor.has_more {
        html.push_str(&action_button("/feed", "load_more", &[], "Load more", ""));
    } else {
        html.push_str(r#"<p class="empty">The End</p>"#);
    }
    html
}

pub fn people_body(view: &PeopleView) -> String {
    let mut html = String::from("<h1>People</h1>");

    if let Some(error) = &view.error {
        html.push_str(&format!(
            r#"<div class="empty"><h3>Something went wrong</h3><p class="error-text">{}</p><a class="button" href="/people">Try again</a></div>"#,
            encode_text(error)
        ));
        return html;
    }
    if let Some((title, detail)) = view.empty_state() {
        html.push_str(&format!(r#"<div class="empty"><h3>{}</h3><p>{}</p></div>"#, title, detail));
        return html;
    }

    for card in view.cards() {
        let person = card.person;
        let badge = card
            .badge
            .map(|b| format!(r#" <span class="badge">{}</span>"#, encode_text(b)))
            .unwrap_or_default();
        let prefs = person
            .category_pref
            .iter()
            .map(|c| encode_text(c).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        html.push_str(&format!(
            r#"<article class="card"><div>{}{}</div><p>{}</p><p class="meta">{}</p></article>"#,
            user_link(&person.username, person.profile_picture.as_deref()),
            badge,
            encode_text(person.bio.as_deref().filter(|b| !b.is_empty()).unwrap_or("No bio available")),
            prefs,
        ));
    }
    html
}

pub fn composer_body(composer: &PostComposer) -> String {
    let image = if composer.image == crate::config::NO_IMAGE { "" } else { composer.image.as_str() };
    let error = composer
        .error
        .as_deref()
        .map(|e| format!(r#"<p class="error-text">{}</p>"#, encode_text(e)))
        .unwrap_or_default();
    format!(
        r#"<section class="card"><h1>Make a Post</h1><form method="post" action="/post"><input type="hidden" name="upid" value="{}"><textarea name="content" rows="6" maxlength="{max}" placeholder="What's on your mind?">{}</textarea>{}<p class="meta">{} / {max}</p><input name="image" placeholder="Image id (optional)" value="{}"><button type="submit">Post</button></form></section>"#,
        encode_double_quoted_attribute(&composer.upid),
        encode_text(&composer.content),
        error,
        composer.content.chars().count(),
        encode_double_quoted_attribute(image),
        max = MAX_POST_LENGTH,
    )
}

pub fn profile_body(view: &ProfileView, now: DateTime<Utc>) -> String {
    let Some(profile) = view.profile.as_ref() else {
        return if view.loading {
            String::from(r#"<p class="empty">Loading...</p>"#)
        } else {
            String::from(r#"<div class="empty"><h3>Profile unavailable</h3></div>"#)
        };
    };
    let target = profile_href(&view.username);
    let own = view.is_own();
    let mut html = String::from(r#"<section class="card">"#);

    html.push_str(&format!(
        r#"<h1><img class="avatar" src="{}" alt=""> {}</h1>"#,
        encode_double_quoted_attribute(&avatar_url(profile.profile_picture.as_deref())),
        encode_text(&profile.username),
    ));

    if own && view.editing {
        html.push_str(&format!(
            r#"<form method="post" action="{}"><input type="hidden" name="action" value="update_bio"><textarea name="bio" rows="3" placeholder="Tell something about yourself">{}</textarea><button type="submit">Save</button></form>{}"#,
            encode_double_quoted_attribute(&target),
            encode_text(profile.bio.as_deref().unwrap_or_default()),
            action_button(&target, "cancel_edit", &[], "Cancel", "plain"),
        ));
    } else {
        html.push_str(&format!(
            "<p>{}</p>",
            encode_text(profile.bio.as_deref().filter(|b| !b.is_empty()).unwrap_or("No bio available"))
        ));
    }

    if !profile.category_pref.is_empty() {
        let prefs: String = profile
            .category_pref
            .iter()
            .map(|c| format!(r#"<span class="badge">{}</span> "#, encode_text(c)))
            .collect();
        html.push_str(&format!("<p>{}</p>", prefs));
    }

    html.push_str(r#"<div class="actions">"#);
    html.push_str(&action_button(
        &target,
        "toggle_followers",
        &[],
        &plural(followers(profile).len(), "Follower", "Followers"),
        "plain",
    ));
    html.push_str(&action_button(
        &target,
        "toggle_following",
        &[],
        &format!("{} Following", followings(profile).len()),
        "plain",
    ));
    if own {
        if !view.editing {
            html.push_str(&action_button(&target, "edit", &[], "Edit Profile", ""));
        }
        html.push_str(r#"<a class="button" href="/logout">Logout</a>"#);
    } else {
        let label = if view.is_following { "Unfollow" } else { "Follow" };
        html.push_str(&action_button(&target, "follow", &[], label, ""));
    }
    html.push_str("</div>");

    if view.followers_open {
        html.push_str(&people_list(followers(profile)));
    }
    if view.following_open {
        html.push_str(&people_list(followings(profile)));
    }
    html.push_str("</section>");

    if own {
        html.push_str(&format!(
            r#"<div class="tabs">{}{}</div>"#,
            action_button(&target, "show_posts", &[], "Posts", if view.tab == ProfileTab::Posts { "" } else { "plain" }),
            action_button(&target, "show_trash", &[], "Trash", if view.tab == ProfileTab::Trash { "" } else { "plain" }),
        ));
    }

    let owner_actions: &[(&str, &str, &str)] = match view.tab {
        ProfileTab::Posts => &[("trash", "Move to trash", "plain")],
        ProfileTab::Trash => &[("restore", "Restore", "plain"), ("delete_permanently", "Delete forever", "danger")],
    };
    let card = PostCard {
        target: &target,
        viewer: &view.viewer,
        post_likers: &view.post_likers,
        comment_likers: &view.comment_likers,
        threads: &view.threads,
        now,
        owner_actions,
    };

    let posts = view.visible();
    if posts.is_empty() && !view.loading {
        let empty = match view.tab {
            ProfileTab::Posts => "No Posts Yet",
            ProfileTab::Trash => "No Trash Yet",
        };
        html.push_str(&format!(r#"<div class="empty"><h3>{}</h3></div>"#, empty));
    }
    for post in posts {
        html.push_str(&card.render(post));
    }
    html
}

pub fn error_body(message: &str) -> String {
    format!(
        r#"<div class="empty"><h3>Something went wrong</h3><p class="error-text">{}</p><a class="button" href="/">Home</a></div>"#,
        encode_text(message)
    )
}
