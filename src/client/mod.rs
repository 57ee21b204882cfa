//! 解析サーバークライアント
//!
//! 2種類のリクエスト（ティア）を扱う:
//! - Quick: 簡易チェック（検出のみ、30秒）
//! - Full:  本解析（検出 + 解釈 + PDF生成、180秒）

mod deadline;
mod http;

pub use deadline::{with_deadline, Interrupted};
pub use http::HttpBackend;

use crate::acquisition::SelectedImage;
use crate::error::Result;
use denticheck_common::{FullAnalysisResult, QuickCheckResult};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// リクエストのティア
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Quick,
    Full,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Quick => write!(f, "quick"),
            Tier::Full => write!(f, "full"),
        }
    }
}

/// 認証コンテキスト（呼び出し側から明示的に渡す）
#[derive(Debug, Clone, Default)]
pub struct Session {
    access_token: Option<String>,
}

impl Session {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            access_token: access_token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Bearerトークン（匿名ならNone）
    pub fn bearer(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}

/// 解析バックエンド
///
/// `cancel` はリクエストの中断に使う。タイムアウトは実装側で管理し、
/// 期限切れは `DentiCheckError::Timeout` として返す。
#[allow(async_fn_in_trait)]
pub trait AnalysisBackend {
    async fn quick_check(&self, image: &SelectedImage, cancel: CancellationToken) -> Result<QuickCheckResult>;

    async fn analyze(&self, image: &SelectedImage, cancel: CancellationToken) -> Result<FullAnalysisResult>;
}
