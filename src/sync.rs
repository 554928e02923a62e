//! Local copies of remote collections: paging, optimistic likes, and the
//! sparse open/closed state of per-item popovers.

use std::collections::HashSet;

use crate::models::models::{Comment, Liker, Post};

// === Pagination ===

/// Offset/limit pair driving "load more".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

impl Cursor {
    pub fn new(limit: usize) -> Self {
        Cursor { limit: limit.max(1), offset: 0, has_more: true }
    }

    pub fn advance(&mut self) {
        self.offset += self.limit;
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.has_more = true;
    }

    /// A page shorter than `limit` is the last one.
    pub fn record(&mut self, returned: usize) {
        self.has_more = returned >= self.limit;
    }

    pub fn query(limit: usize, offset: usize) -> [(&'static str, usize); 2] {
        [("limit", limit), ("offset", offset)]
    }
}

/// Items that can be located inside a list by a stable id.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Post {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Comment {
    fn key(&self) -> &str {
        &self.comment_id
    }
}

pub fn find_mut<'a, T: Keyed>(items: &'a mut [T], key: &str) -> Option<&'a mut T> {
    items.iter_mut().find(|item| item.key() == key)
}

/// A page-at-a-time copy of a remote list.
#[derive(Debug, Clone)]
pub struct PagedList<T> {
    items: Vec<T>,
    pub cursor: Cursor,
    pub total: u64,
    loading: bool,
    loaded_once: bool,
}

impl<T: Keyed> PagedList<T> {
    pub fn new(limit: usize) -> Self {
        PagedList {
            items: Vec::new(),
            cursor: Cursor::new(limit),
            total: 0,
            loading: false,
            loaded_once: false,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn loaded_once(&self) -> bool {
        self.loaded_once
    }

    /// Marks a fetch as in flight; returns the `(limit, offset)` to request.
    pub fn begin_load(&mut self) -> (usize, usize) {
        self.loading = true;
        (self.cursor.limit, self.cursor.offset)
    }

    /// Clears the in-flight flag whatever the outcome.
    pub fn end_load(&mut self) {
        self.loading = false;
    }

    /// Merge a page fetched at `offset`. Offset zero replaces the list.
    pub fn apply_page(&mut self, offset: usize, page: Vec<T>, total: u64) {
        self.cursor.record(page.len());
        if offset == 0 {
            self.items = page;
        } else {
            self.items.extend(page);
        }
        self.total = total;
        self.loaded_once = true;
    }

    /// Drop everything and start again from the first page.
    pub fn reset(&mut self) {
        self.items.clear();
        self.cursor.reset();
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        find_mut(&mut self.items, key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.iter().find(|item| item.key() == key)
    }

    pub fn insert(&mut self, index: usize, item: T) {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        let idx = self.items.iter().position(|item| item.key() == key)?;
        Some(self.items.remove(idx))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(Keyed::key)
    }
}

// === Optimistic likes ===

/// Something the current user can like.
pub trait Likeable {
    fn likers(&self) -> &[Liker];
    /// Add or remove `user` and keep any counter in step. Idempotent.
    fn set_liked(&mut self, user: &str, liked: bool);

    fn is_liked_by(&self, user: &str) -> bool {
        self.likers().iter().any(|l| l.username == user)
    }
}

impl Likeable for Post {
    fn likers(&self) -> &[Liker] {
        &self.post.liked_by
    }

    fn set_liked(&mut self, user: &str, liked: bool) {
        let present = self.is_liked_by(user);
        if liked && !present {
            self.post.liked_by.push(Liker::named(user));
            self.post.likes += 1;
        } else if !liked && present {
            self.post.liked_by.retain(|l| l.username != user);
            self.post.likes = self.post.likes.saturating_sub(1);
        }
    }
}

impl Likeable for Comment {
    fn likers(&self) -> &[Liker] {
        &self.liked_by
    }

    fn set_liked(&mut self, user: &str, liked: bool) {
        let present = self.is_liked_by(user);
        if liked && !present {
            self.liked_by.push(Liker::named(user));
        } else if !liked && present {
            self.liked_by.retain(|l| l.username != user);
        }
    }
}

/// A like toggle that has been applied locally but not yet confirmed.
///
/// `apply` shows the new state while the request is in flight; `rollback`
/// restores what was there before if the request fails.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending toggle must be settled"]
pub struct LikeToggle {
    pub user: String,
    pub was_liked: bool,
}

impl LikeToggle {
    /// Flip `user`'s like on `item` right away.
    pub fn apply<L: Likeable>(item: &mut L, user: &str) -> Self {
        let was_liked = item.is_liked_by(user);
        item.set_liked(user, !was_liked);
        LikeToggle { user: user.to_string(), was_liked }
    }

    pub fn now_liked(&self) -> bool {
        !self.was_liked
    }

    pub fn rollback<L: Likeable>(&self, item: &mut L) {
        item.set_liked(&self.user, self.was_liked);
    }
}

// === Popover / thread visibility ===

/// The ids whose auxiliary view (likers list, comment thread) is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedSet {
    open: HashSet<String>,
}

impl ExpandedSet {
    pub fn toggle(&mut self, id: &str) -> bool {
        if !self.open.remove(id) {
            self.open.insert(id.to_string());
            return true;
        }
        false
    }

    pub fn open(&mut self, id: &str) {
        self.open.insert(id.to_string());
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.open.contains(id)
    }

    /// Forget ids that no longer exist in the list.
    pub fn retain_known<'a>(&mut self, known: impl IntoIterator<Item = &'a str>) {
        let known: HashSet<&str> = known.into_iter().collect();
        self.open.retain(|id| known.contains(id.as_str()));
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

/// Id awaiting a yes/no in the delete confirmation modal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingDelete(Option<String>);

impl PendingDelete {
    pub fn request(&mut self, id: &str) {
        self.0 = Some(id.to_string());
    }

    pub fn take(&mut self) -> Option<String> {
        self.0.take()
    }

    pub fn cancel(&mut self) {
        self.0 = None;
    }

    pub fn target(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{comment, post};

    #[test]
    fn cursor_pages_and_stops_on_short_page() {
        let mut cursor = Cursor::new(15);
        cursor.record(15);
        assert!(cursor.has_more);
        cursor.advance();
        assert_eq!(cursor.offset, 15);
        cursor.record(4);
        assert!(!cursor.has_more);
        cursor.reset();
        assert_eq!((cursor.offset, cursor.has_more), (0, true));
    }

    #[test]
    fn later_pages_append_first_page_replaces() {
        let mut list: PagedList<Post> = PagedList::new(2);
        list.apply_page(0, vec![post("a", "x", &[]), post("b", "x", &[])], 5);
        list.apply_page(2, vec![post("c", "x", &[])], 5);
        assert_eq!(list.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert!(!list.cursor.has_more);

        list.apply_page(0, vec![post("z", "x", &[])], 1);
        assert_eq!(list.keys().collect::<Vec<_>>(), ["z"]);
        assert_eq!(list.total, 1);
    }

    #[test]
    fn load_flag_is_scoped() {
        let mut list: PagedList<Post> = PagedList::new(3);
        assert_eq!(list.begin_load(), (3, 0));
        assert!(list.is_loading());
        list.end_load();
        assert!(!list.is_loading());
        assert!(!list.loaded_once());
    }

    #[test]
    fn like_toggle_patches_and_rolls_back() {
        let mut p = post("a", "x", &["bo", "cy", "di"]);
        let toggle = LikeToggle::apply(&mut p, "ana");
        assert!(toggle.now_liked());
        assert_eq!(p.post.likes, 4);
        assert!(p.is_liked_by("ana"));

        toggle.rollback(&mut p);
        assert_eq!(p.post.likes, 3);
        assert!(!p.is_liked_by("ana"));
    }

    #[test]
    fn unlike_never_underflows_or_duplicates() {
        let mut p = post("a", "x", &["ana"]);
        p.post.likes = 0;
        let toggle = LikeToggle::apply(&mut p, "ana");
        assert!(!toggle.now_liked());
        assert_eq!(p.post.likes, 0);

        p.set_liked("bo", true);
        p.set_liked("bo", true);
        assert_eq!(p.likers().len(), 1);
    }

    #[test]
    fn comment_likes_have_no_separate_counter() {
        let mut c = comment("c1", "bo", &[]);
        let toggle = LikeToggle::apply(&mut c, "ana");
        assert_eq!(c.likers().len(), 1);
        toggle.rollback(&mut c);
        assert!(c.likers().is_empty());
    }

    #[test]
    fn expanded_set_is_sparse() {
        let mut open = ExpandedSet::default();
        assert!(open.toggle("a"));
        assert!(open.toggle("b"));
        assert!(!open.toggle("a"));
        assert!(!open.is_open("a"));
        open.retain_known(["c"]);
        assert!(open.is_empty());
    }

    #[test]
    fn pending_delete_is_taken_once() {
        let mut modal = PendingDelete::default();
        modal.request("p1");
        assert_eq!(modal.target(), Some("p1"));
        assert_eq!(modal.take().as_deref(), Some("p1"));
        assert_eq!(modal.take(), None);
    }
}
