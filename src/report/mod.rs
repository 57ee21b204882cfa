//! PDFリポートの取得と検証
//!
//! ダウンロードしたファイルは次を満たす場合のみ有効とする:
//! - 512バイト以上
//! - 先頭が `%PDF-`
//!
//! 無効なファイルはビューアへ渡さない。

use crate::client::with_deadline;
use crate::config::Config;
use crate::error::{ArtifactDefect, DentiCheckError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const MIN_REPORT_BYTES: u64 = 512;
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(60);
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

lazy_static! {
    static ref UNSAFE_SESSION_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
}

/// 検証済みのリポート
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedReport {
    pub path: PathBuf,
    pub byte_len: u64,
}

/// セッションIDを安全な文字だけに整形
pub fn sanitize_session_id(session_id: &str) -> String {
    UNSAFE_SESSION_CHARS.replace_all(session_id, "").into_owned()
}

/// セッション単位の保存ファイル名
pub fn report_file_name(session_id: &str, now_millis: i64) -> String {
    let safe = sanitize_session_id(session_id);
    let safe = if safe.is_empty() { now_millis.to_string() } else { safe };
    format!("denticheck-report-{}.pdf", safe)
}

/// エミュレータ環境向けにダウンロードURLのホストを書き換える
///
/// `emulator_host` が未設定なら何もしない。`/reports/` 配下は
/// スキームとポートをAPIサーバーに合わせる。
pub fn resolve_download_url(raw: &str, api_base: Option<&str>, emulator_host: Option<&str>) -> String {
    let Some(host) = emulator_host.filter(|h| !h.is_empty()) else {
        return raw.to_string();
    };

    let rewritten = raw
        .replace("://localhost", &format!("://{}", host))
        .replace("://127.0.0.1", &format!("://{}", host));

    let Some(api) = api_base.and_then(|base| Url::parse(base).ok()) else {
        return rewritten;
    };
    let Ok(mut url) = Url::parse(&rewritten) else {
        return rewritten;
    };

    if url.path().starts_with("/reports/") {
        if url.set_scheme(api.scheme()).is_err()
            || url.set_host(Some(host)).is_err()
            || url.set_port(api.port()).is_err()
        {
            return rewritten;
        }
    }

    url.to_string()
}

/// ダウンロード済みファイルを検証
pub fn verify_report(path: &Path, url: &str) -> Result<DownloadedReport> {
    let invalid = |defect| DentiCheckError::InvalidArtifact {
        defect,
        url: url.to_string(),
    };

    let byte_len = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return Err(invalid(ArtifactDefect::EmptyOrCorrupt)),
    };
    if byte_len < MIN_REPORT_BYTES {
        warn!(byte_len, "report too small");
        return Err(invalid(ArtifactDefect::EmptyOrCorrupt));
    }

    let mut head = [0u8; 16];
    let n = std::fs::File::open(path)?.read(&mut head)?;
    if !head[..n].starts_with(PDF_SIGNATURE) {
        warn!(head = ?String::from_utf8_lossy(&head[..n]), "report is not a PDF");
        return Err(invalid(ArtifactDefect::WrongFormat));
    }

    Ok(DownloadedReport {
        path: path.to_path_buf(),
        byte_len,
    })
}

/// リポート取得
pub struct ReportFetcher {
    client: reqwest::Client,
    report_dir: PathBuf,
    api_base: Option<String>,
    emulator_host: Option<String>,
    timeout: Duration,
}

impl ReportFetcher {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            report_dir: report_dir.into(),
            api_base: None,
            emulator_host: None,
            timeout: DEFAULT_REPORT_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.report_dir())
            .with_emulator_host(config.api_base_url().ok(), config.emulator_host.clone())
            .with_timeout(config.report_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_emulator_host(mut self, api_base: Option<String>, emulator_host: Option<String>) -> Self {
        self.api_base = api_base;
        self.emulator_host = emulator_host;
        self
    }

    /// 実際にアクセスするURL
    pub fn resolve(&self, report_url: &str) -> String {
        resolve_download_url(report_url, self.api_base.as_deref(), self.emulator_host.as_deref())
    }

    pub fn target_path(&self, session_id: &str) -> PathBuf {
        self.report_dir
            .join(report_file_name(session_id, chrono::Utc::now().timestamp_millis()))
    }

    /// ダウンロードして検証する（同じセッションのファイルは上書き）
    pub async fn retrieve(&self, report_url: &str, session_id: &str) -> Result<DownloadedReport> {
        let url = self.resolve(report_url);
        if url != report_url {
            debug!(from = %report_url, to = %url, "report url rewritten");
        }

        tokio::fs::create_dir_all(&self.report_dir).await?;
        let target = self.target_path(session_id);

        let cancel = CancellationToken::new();
        let outcome = match with_deadline(self.download(&url, &target), self.timeout, &cancel).await {
            Ok(Ok(())) => verify_report(&target, &url),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(%url, timeout = ?self.timeout, "report download timed out");
                discard(&target).await;
                Err(DentiCheckError::DownloadTimeout)
            }
        };

        match outcome {
            Ok(report) => {
                info!(path = %report.path.display(), bytes = report.byte_len, "report downloaded");
                Ok(report)
            }
            Err(e @ DentiCheckError::InvalidArtifact { .. }) => {
                discard(&target).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// 本文を書き出す。書き込み途中で失敗したらファイルを残さない
    async fn download(&self, url: &str, target: &Path) -> Result<()> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DentiCheckError::Http {
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(target).await?;
        let written = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<(), DentiCheckError>(())
        }
        .await;
        drop(file);

        if written.is_err() {
            discard(target).await;
        }
        written
    }
}

/// 不完全・不正なファイルを削除
async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "discarded invalid report"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove invalid report"),
    }
}
