use crate::error::{DentiCheckError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_API_SERVER_URL: &str = "DENTICHECK_API_SERVER_URL";
pub const ENV_ACCESS_TOKEN: &str = "DENTICHECK_ACCESS_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 解析サーバーのベースURL（未設定なら解析は無効）
    pub api_base_url: Option<String>,
    /// コミュニティ用GraphQLエンドポイント（未設定なら {base}/graphql）
    pub graphql_url: Option<String>,
    pub access_token: Option<String>,
    pub quick_timeout_secs: u64,
    pub analyze_timeout_secs: u64,
    pub report_timeout_secs: u64,
    /// PDFリポートの保存先
    pub report_dir: Option<PathBuf>,
    /// エミュレータからホストのループバックへ到達するためのホスト名
    pub emulator_host: Option<String>,
    /// 優先して使うPDFビューア（先頭から順に試す）
    pub preferred_viewers: Vec<String>,
    /// アプリ指定での起動ができる環境か
    pub targeted_launch: bool,
    /// カメラ撮影に使う外部コマンド（出力先パスを最後の引数として渡す）
    pub camera_command: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            graphql_url: None,
            access_token: None,
            quick_timeout_secs: 30,
            analyze_timeout_secs: 180,
            report_timeout_secs: 60,
            report_dir: None,
            emulator_host: None,
            preferred_viewers: vec![
                "foxitreader".into(),
                "FoxitReader".into(),
                "foxit-pdf-reader".into(),
            ],
            targeted_launch: cfg!(any(target_os = "linux", target_os = "windows")),
            camera_command: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };

        Ok(config.with_env_overrides())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| DentiCheckError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("denticheck").join("config.json"))
    }

    /// 環境変数を優先
    fn with_env_overrides(mut self) -> Self {
        if let Some(url) = non_empty_env(ENV_API_SERVER_URL) {
            self.api_base_url = Some(url);
        }
        if let Some(token) = non_empty_env(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
        self
    }

    /// 末尾スラッシュを除いたベースURL
    pub fn api_base_url(&self) -> Result<String> {
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or(DentiCheckError::NotConfigured)
    }

    pub fn graphql_url(&self) -> Result<String> {
        match self.graphql_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url.to_string()),
            _ => Ok(format!("{}/graphql", self.api_base_url()?)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_base_url().is_ok()
    }

    pub fn quick_timeout(&self) -> Duration {
        Duration::from_secs(self.quick_timeout_secs)
    }

    pub fn analyze_timeout(&self) -> Duration {
        Duration::from_secs(self.analyze_timeout_secs)
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.report_timeout_secs)
    }

    /// リポート保存先（ドキュメント → 一時ディレクトリの順）
    pub fn report_dir(&self) -> PathBuf {
        self.report_dir
            .clone()
            .or_else(|| dirs::document_dir().map(|d| d.join("denticheck")))
            .unwrap_or_else(|| std::env::temp_dir().join("denticheck"))
    }

    pub fn set_base_url(&mut self, url: String) -> Result<()> {
        self.api_base_url = Some(url);
        self.save()
    }

    pub fn set_access_token(&mut self, token: String) -> Result<()> {
        self.access_token = Some(token);
        self.save()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
