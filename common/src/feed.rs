//! コミュニティフィードのローカル投影
//!
//! 投稿一覧クエリの結果を保持し、いいね切替ミューテーションの
//! サーバー確定結果だけを該当投稿へ反映する（楽観的更新はしない）。

use serde::{Deserialize, Serialize};

/// 投稿のタグ（製品・病院）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostTag {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub id: Option<String>,
}

/// 投稿
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub author_initial: String,
    pub content: String,
    pub images: Vec<String>,
    pub tags: Vec<PostTag>,
    pub likes: u32,
    pub comments: u32,
    pub created_at: Option<String>,
    pub post_type: Option<String>,
    pub is_mine: bool,
    pub is_liked: bool,
}

/// いいね切替ミューテーションの確定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggle {
    pub is_liked: bool,
    pub like_count: u32,
}

/// 一覧の種類
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedView {
    #[default]
    All,
    /// 自分がいいねした投稿
    Liked,
    /// 自分の投稿
    Mine,
}

impl FeedView {
    /// GraphQLレスポンスで一覧が入っているフィールド名
    pub fn field_name(&self) -> &'static str {
        match self {
            FeedView::All => "posts",
            FeedView::Liked => "postsLikedByMe",
            FeedView::Mine => "postsByMe",
        }
    }
}

/// 投稿一覧の投影
#[derive(Debug, Clone, Default)]
pub struct FeedProjection {
    view: FeedView,
    posts: Vec<Post>,
}

impl FeedProjection {
    pub fn new(view: FeedView, posts: Vec<Post>) -> Self {
        Self { view, posts }
    }

    pub fn view(&self) -> FeedView {
        self.view
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn get(&self, post_id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == post_id)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// 確定したいいね状態を反映
    ///
    /// 該当IDの投稿だけを書き換える。「いいねした投稿」一覧で
    /// いいねが外れた場合は一覧から取り除く。
    /// 該当投稿がなければ何もせず false を返す。
    pub fn apply_like_toggle(&mut self, post_id: &str, toggle: LikeToggle) -> bool {
        let Some(idx) = self.posts.iter().position(|p| p.id == post_id) else {
            return false;
        };

        if self.view == FeedView::Liked && !toggle.is_liked {
            self.posts.remove(idx);
            return true;
        }

        let post = &mut self.posts[idx];
        post.is_liked = toggle.is_liked;
        post.likes = toggle.like_count;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, likes: u32, is_liked: bool) -> Post {
        Post {
            id: id.to_string(),
            author: "user".to_string(),
            likes,
            is_liked,
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_like_toggle_updates_only_target() {
        let mut feed = FeedProjection::new(FeedView::All, vec![post("1", 3, false), post("2", 5, true)]);

        let applied = feed.apply_like_toggle("1", LikeToggle { is_liked: true, like_count: 4 });
        assert!(applied);
        assert_eq!(feed.get("1").unwrap().likes, 4);
        assert!(feed.get("1").unwrap().is_liked);
        assert_eq!(feed.get("2").unwrap(), &post("2", 5, true));
    }

    #[test]
    fn test_apply_like_toggle_unknown_id() {
        let mut feed = FeedProjection::new(FeedView::All, vec![post("1", 3, false)]);
        let applied = feed.apply_like_toggle("999", LikeToggle { is_liked: true, like_count: 1 });
        assert!(!applied);
        assert_eq!(feed.get("1").unwrap().likes, 3);
    }

    #[test]
    fn test_unlike_in_liked_view_removes_post() {
        let mut feed = FeedProjection::new(FeedView::Liked, vec![post("1", 3, true), post("2", 1, true)]);
        feed.apply_like_toggle("1", LikeToggle { is_liked: false, like_count: 2 });
        assert_eq!(feed.len(), 1);
        assert!(feed.get("1").is_none());
    }

    #[test]
    fn test_post_deserialize_with_defaults() {
        let json = r#"{"id": "p1", "content": "hello", "tags": [{"type": "hospital", "name": "A歯科", "id": "h1"}]}"#;
        let post: Post = serde_json::from_str(json).unwrap();
        assert_eq!(post.id, "p1");
        assert_eq!(post.likes, 0);
        assert!(!post.is_liked);
        assert_eq!(post.tags[0].kind, "hospital");
        assert_eq!(post.tags[0].id.as_deref(), Some("h1"));
    }

    #[test]
    fn test_view_field_names() {
        assert_eq!(FeedView::All.field_name(), "posts");
        assert_eq!(FeedView::Liked.field_name(), "postsLikedByMe");
        assert_eq!(FeedView::Mine.field_name(), "postsByMe");
    }
}
