use crate::acquisition::ImageSource;
use crate::client::Tier;
use thiserror::Error;

/// ダウンロードしたリポートの不備
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactDefect {
    /// 存在しない、または最小サイズ未満
    EmptyOrCorrupt,
    /// 先頭バイトがPDFシグネチャと一致しない
    WrongFormat,
}

impl std::fmt::Display for ArtifactDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactDefect::EmptyOrCorrupt => write!(f, "ダウンロードしたPDFが空か破損しています"),
            ArtifactDefect::WrongFormat => write!(f, "ダウンロードした応答がPDF形式ではありません"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DentiCheckError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("解析サーバーのURLが設定されていません。`denticheck config --set-base-url URL` または DENTICHECK_API_SERVER_URL で設定してください")]
    NotConfigured,

    #[error("{0}の権限が必要です")]
    PermissionDenied(ImageSource),

    #[error("画像の選択がキャンセルされました")]
    Cancelled,

    #[error("画像を読み込めませんでした: {0}")]
    ImageLoad(String),

    #[error("{}", timeout_message(.0))]
    Timeout(Tier),

    #[error("ネットワークエラー: {0}")]
    Network(String),

    #[error("リクエスト失敗 (HTTP {status})")]
    Http { status: u16 },

    #[error("リクエスト失敗 (HTTP {status})")]
    MalformedResponse { status: u16 },

    #[error("PDFリポートの取得がタイムアウトしました")]
    DownloadTimeout,

    #[error("{defect}")]
    InvalidArtifact { defect: ArtifactDefect, url: String },

    #[error("PDFを開けるアプリが見つかりません")]
    ViewerUnavailable,

    #[error("GraphQLエラー: {0}")]
    GraphQl(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

fn timeout_message(tier: &Tier) -> &'static str {
    match tier {
        Tier::Quick => "簡易チェックがタイムアウトしました",
        Tier::Full => "AI解析がタイムアウトしました",
    }
}

impl From<reqwest::Error> for DentiCheckError {
    fn from(e: reqwest::Error) -> Self {
        DentiCheckError::Network(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DentiCheckError>;
