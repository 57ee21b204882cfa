//! コミュニティフィードのGraphQLクライアント
//!
//! 投稿一覧の取得と、いいね切替ミューテーション。ミューテーションの結果は
//! サーバーが確定した値だけを `FeedProjection` に反映する。

use crate::client::Session;
use crate::config::Config;
use crate::error::{DentiCheckError, Result};
use denticheck_common::{FeedProjection, FeedView, LikeToggle, Post};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

pub const PAGE_SIZE: u32 = 10;

const POST_FIELDS: &str = "id author authorInitial content images tags { type name id } \
likes comments createdAt postType isMine isLiked";

const TOGGLE_POST_LIKE: &str =
    "mutation TogglePostLike($postId: ID!) { togglePostLike(postId: $postId) { isLiked likeCount } }";

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleData {
    toggle_post_like: Option<LikeToggle>,
}

/// 一覧クエリ（`posts` / `postsLikedByMe` / `postsByMe`）
fn posts_query(view: FeedView) -> String {
    let field = view.field_name();
    match view {
        FeedView::All => format!(
            "query Posts($limit: Int, $offset: Int, $postType: String) \
             {{ {}(limit: $limit, offset: $offset, postType: $postType) {{ {} }} }}",
            field, POST_FIELDS
        ),
        FeedView::Liked | FeedView::Mine => format!(
            "query Posts($limit: Int, $offset: Int) {{ {}(limit: $limit, offset: $offset) {{ {} }} }}",
            field, POST_FIELDS
        ),
    }
}

/// サーバーが返す画像URLを、設定済みのAPIサーバー基準に直す
///
/// - `localhost` / `127.0.0.1` → ベースURLのオリジン + パス + クエリ
/// - `/` で始まる相対パス → ベースURLを前置
/// - それ以外はそのまま
pub fn resolve_image_url(url: &str, api_base: &str) -> String {
    if url.trim().is_empty() {
        return url.to_string();
    }

    match Url::parse(url) {
        Ok(parsed) => {
            let loopback = matches!(parsed.host_str(), Some("localhost") | Some("127.0.0.1"));
            match Url::parse(api_base) {
                Ok(base) if loopback => {
                    let query = parsed.query().map(|q| format!("?{}", q)).unwrap_or_default();
                    format!("{}{}{}", base.origin().ascii_serialization(), parsed.path(), query)
                }
                _ => url.to_string(),
            }
        }
        Err(_) if url.starts_with('/') => format!("{}{}", api_base.trim_end_matches('/'), url),
        Err(_) => url.to_string(),
    }
}

pub struct FeedClient {
    client: reqwest::Client,
    endpoint: String,
    api_base: String,
    session: Session,
}

impl FeedClient {
    pub fn new(endpoint: impl Into<String>, api_base: impl Into<String>, session: Session) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_base: api_base.into(),
            session,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.graphql_url()?,
            config.api_base_url()?,
            Session::new(config.access_token.clone()),
        ))
    }

    async fn execute<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = self.session.bearer() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DentiCheckError::Http {
                status: status.as_u16(),
            });
        }

        let body: GraphQlResponse<T> = response.json().await?;
        if let Some(first) = body.errors.first() {
            warn!(errors = body.errors.len(), message = %first.message, "graphql errors");
            return Err(DentiCheckError::GraphQl(first.message.clone()));
        }
        body.data
            .ok_or_else(|| DentiCheckError::GraphQl("レスポンスにdataがありません".into()))
    }

    /// 一覧を1ページ取得して投影を作る
    pub async fn fetch(&self, view: FeedView, offset: u32) -> Result<FeedProjection> {
        let mut variables = json!({ "limit": PAGE_SIZE, "offset": offset });
        if view == FeedView::All {
            variables["postType"] = Value::Null;
        }

        let mut data: Value = self.execute(&posts_query(view), variables).await?;
        let list = data
            .get_mut(view.field_name())
            .map(Value::take)
            .unwrap_or(Value::Array(Vec::new()));
        let mut posts: Vec<Post> = if list.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(list)?
        };

        for post in &mut posts {
            for image in &mut post.images {
                *image = resolve_image_url(image, &self.api_base);
            }
        }

        debug!(view = view.field_name(), count = posts.len(), "feed fetched");
        Ok(FeedProjection::new(view, posts))
    }

    /// いいねを切り替え、確定した結果だけを投影へ反映
    ///
    /// 失敗時は投影を変更しない。
    pub async fn toggle_like(&self, feed: &mut FeedProjection, post_id: &str) -> Result<LikeToggle> {
        let data: ToggleData = self
            .execute(TOGGLE_POST_LIKE, json!({ "postId": post_id }))
            .await?;
        let toggle = data
            .toggle_post_like
            .ok_or_else(|| DentiCheckError::GraphQl("togglePostLike の結果がありません".into()))?;

        let applied = feed.apply_like_toggle(post_id, toggle);
        info!(post_id, is_liked = toggle.is_liked, likes = toggle.like_count, applied, "like toggled");
        Ok(toggle)
    }
}
