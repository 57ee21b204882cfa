//! reqwest による解析サーバー呼び出し
//!
//! - `POST {base}/api/ai-check/quick`
//! - `POST {base}/api/ai-check/analyze?generatePdf=true`
//!
//! どちらも multipart の `file` フィールドに画像1枚を載せる。

use super::deadline::{with_deadline, Interrupted};
use super::{AnalysisBackend, Session, Tier};
use crate::acquisition::SelectedImage;
use crate::config::Config;
use crate::error::{DentiCheckError, Result};
use denticheck_common::{parse_analyze_response, parse_quick_response, FullAnalysisResult, QuickCheckResult};
use reqwest::multipart::{Form, Part};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const QUICK_PATH: &str = "/api/ai-check/quick";
const ANALYZE_PATH: &str = "/api/ai-check/analyze?generatePdf=true";

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    session: Session,
    quick_timeout: Duration,
    analyze_timeout: Duration,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        session: Session,
        quick_timeout: Duration,
        analyze_timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            quick_timeout,
            analyze_timeout,
        }
    }

    /// 設定から作成（ベースURL未設定なら NotConfigured）
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.api_base_url()?,
            Session::new(config.access_token.clone()),
            config.quick_timeout(),
            config.analyze_timeout(),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, tier: Tier) -> String {
        match tier {
            Tier::Quick => format!("{}{}", self.base_url, QUICK_PATH),
            Tier::Full => format!("{}{}", self.base_url, ANALYZE_PATH),
        }
    }

    fn timeout(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Quick => self.quick_timeout,
            Tier::Full => self.analyze_timeout,
        }
    }

    /// 画像1枚の multipart ペイロード
    async fn build_form(image: &SelectedImage) -> Result<Form> {
        let bytes = tokio::fs::read(&image.location).await.map_err(|e| {
            DentiCheckError::ImageLoad(format!("{}: {}", image.location.display(), e))
        })?;
        let part = Part::bytes(bytes)
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| DentiCheckError::ImageLoad(format!("MIMEタイプが不正です: {}", e)))?;
        Ok(Form::new().part("file", part))
    }

    /// 送信して (ステータス, 本文) を返す。期限は本文の読み取りまで含む
    async fn exchange(
        &self,
        tier: Tier,
        image: &SelectedImage,
        cancel: &CancellationToken,
    ) -> Result<(u16, String)> {
        let form = Self::build_form(image).await?;
        let url = self.endpoint(tier);

        let mut request = self.client.post(&url).multipart(form);
        if let Some(token) = self.session.bearer() {
            request = request.bearer_auth(token);
        }

        debug!(%tier, %url, authorized = self.session.bearer().is_some(), "sending analysis request");
        let started = Instant::now();

        let exchange = async move {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        match with_deadline(exchange, self.timeout(tier), cancel).await {
            Ok(Ok((status, body))) => {
                info!(%tier, status, elapsed_ms = started.elapsed().as_millis() as u64, "analysis response received");
                Ok((status, body))
            }
            Ok(Err(e)) => {
                warn!(%tier, error = %e, "analysis request failed");
                Err(e.into())
            }
            Err(Interrupted::Elapsed) => {
                warn!(%tier, timeout_secs = self.timeout(tier).as_secs(), "analysis request timed out");
                Err(DentiCheckError::Timeout(tier))
            }
            Err(Interrupted::Cancelled) => Err(DentiCheckError::Network("リクエストが中断されました".into())),
        }
    }
}

/// 非2xxは Http、空・不正な本文は MalformedResponse
fn check_status(status: u16) -> Result<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(DentiCheckError::Http { status })
    }
}

impl AnalysisBackend for HttpBackend {
    async fn quick_check(&self, image: &SelectedImage, cancel: CancellationToken) -> Result<QuickCheckResult> {
        let (status, body) = self.exchange(Tier::Quick, image, &cancel).await?;
        check_status(status)?;
        parse_quick_response(&body).map_err(|e| {
            debug!(error = %e, "quick response rejected");
            DentiCheckError::MalformedResponse { status }
        })
    }

    async fn analyze(&self, image: &SelectedImage, cancel: CancellationToken) -> Result<FullAnalysisResult> {
        let (status, body) = self.exchange(Tier::Full, image, &cancel).await?;
        check_status(status)?;
        parse_analyze_response(&body).map_err(|e| {
            debug!(error = %e, "analyze response rejected");
            DentiCheckError::MalformedResponse { status }
        })
    }
}
