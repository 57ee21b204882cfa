//! AIチェックのワークフロー
//!
//! 画像選択 → 簡易チェック / 本解析（互いに独立）→ PDFリポート取得 → ビューア。
//!
//! 状態はワークフロー単位で1つだけ持ち、画像を選び直したときに
//! まとめてリセットする。リセット前に投げたリクエストの結果は
//! 世代番号で判別して捨てる。

mod notice;

pub use notice::{ConsoleNotifier, Notice, NoticeKind, Notifier, RecordingNotifier};

use crate::acquisition::{acquire, ImageSource, Picker, SelectedImage};
use crate::client::{AnalysisBackend, Tier};
use crate::error::{DentiCheckError, Result};
use crate::report::{DownloadedReport, ReportFetcher};
use crate::viewer::{OpenedBy, ViewerChain};
use denticheck_common::{FullAnalysisResult, QuickCheckResult};
use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// ティアごとの状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TierState {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug)]
struct TierSlot<T> {
    state: TierState,
    result: Option<T>,
    error: Option<String>,
    cancel: Option<CancellationToken>,
}

impl<T> Default for TierSlot<T> {
    fn default() -> Self {
        Self {
            state: TierState::Idle,
            result: None,
            error: None,
            cancel: None,
        }
    }
}

impl<T> TierSlot<T> {
    fn abort(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

#[derive(Debug, Default)]
struct WorkflowRun {
    generation: u64,
    image: Option<SelectedImage>,
    quick: TierSlot<QuickCheckResult>,
    full: TierSlot<FullAnalysisResult>,
    downloading: bool,
}

impl WorkflowRun {
    /// 新しい画像で置き換え、依存する状態をすべて破棄
    fn reset_with(&mut self, image: SelectedImage) {
        self.quick.abort();
        self.full.abort();
        self.generation += 1;
        self.image = Some(image);
        self.quick = TierSlot::default();
        self.full = TierSlot::default();
    }
}

fn lock_run(run: &Mutex<WorkflowRun>) -> MutexGuard<'_, WorkflowRun> {
    run.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 処理中の future が途中で破棄されたときに状態を戻す
///
/// `disarm` せずに drop されると `rollback` を実行する。
struct InFlight<'a, F: FnOnce(&mut WorkflowRun)> {
    run: &'a Mutex<WorkflowRun>,
    rollback: Option<F>,
}

impl<'a, F: FnOnce(&mut WorkflowRun)> InFlight<'a, F> {
    fn new(run: &'a Mutex<WorkflowRun>, rollback: F) -> Self {
        Self {
            run,
            rollback: Some(rollback),
        }
    }

    fn disarm(mut self) {
        self.rollback = None;
    }
}

impl<F: FnOnce(&mut WorkflowRun)> Drop for InFlight<'_, F> {
    fn drop(&mut self) {
        if let Some(rollback) = self.rollback.take() {
            let mut run = lock_run(self.run);
            rollback(&mut *run);
        }
    }
}

fn quick_slot(run: &mut WorkflowRun) -> &mut TierSlot<QuickCheckResult> {
    &mut run.quick
}

fn full_slot(run: &mut WorkflowRun) -> &mut TierSlot<FullAnalysisResult> {
    &mut run.full
}

/// 表示層に見せる状態
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSnapshot {
    pub image: Option<SelectedImage>,
    pub quick_state: TierState,
    pub quick_result: Option<QuickCheckResult>,
    pub quick_error: Option<String>,
    pub full_state: TierState,
    pub full_result: Option<FullAnalysisResult>,
    pub full_error: Option<String>,
    pub downloading: bool,
}

impl WorkflowSnapshot {
    /// 本解析が成功していて、リポートURLがある
    pub fn can_download_report(&self) -> bool {
        self.full_state == TierState::Success
            && self
                .full_result
                .as_ref()
                .and_then(|r| r.report_url())
                .is_some()
    }
}

const ABANDONED: &str = "処理が中断されました";

fn tier_title(tier: Tier) -> &'static str {
    match tier {
        Tier::Quick => "簡易チェック失敗",
        Tier::Full => "AI解析失敗",
    }
}

/// ワークフロー本体
///
/// `backend` が None のとき（ベースURL未設定）は解析を一切行わない。
pub struct AiCheckWorkflow<B, N> {
    backend: Option<B>,
    notifier: N,
    run: Mutex<WorkflowRun>,
}

impl<B: AnalysisBackend, N: Notifier> AiCheckWorkflow<B, N> {
    pub fn new(backend: Option<B>, notifier: N) -> Self {
        Self {
            backend,
            notifier,
            run: Mutex::new(WorkflowRun::default()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowRun> {
        lock_run(&self.run)
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let run = self.lock();
        WorkflowSnapshot {
            image: run.image.clone(),
            quick_state: run.quick.state,
            quick_result: run.quick.result.clone(),
            quick_error: run.quick.error.clone(),
            full_state: run.full.state,
            full_result: run.full.result.clone(),
            full_error: run.full.error.clone(),
            downloading: run.downloading,
        }
    }

    /// 画像を選ぶ。成功時のみ結果と状態をリセットする
    pub async fn select_image<P: Picker>(&self, picker: &P, source: ImageSource) -> Option<SelectedImage> {
        match acquire(picker, source).await {
            Ok(image) => {
                let mut run = self.lock();
                run.reset_with(image.clone());
                debug!(generation = run.generation, "workflow reset for new image");
                Some(image)
            }
            Err(DentiCheckError::Cancelled) => {
                debug!(%source, "image selection cancelled");
                None
            }
            Err(e @ DentiCheckError::PermissionDenied(_)) => {
                self.notifier.notify(Notice::error("権限が必要です", e.to_string()));
                None
            }
            Err(e) => {
                warn!(error = %e, "image acquisition failed");
                self.notifier.notify(Notice::error("エラー", e.to_string()));
                None
            }
        }
    }

    /// 簡易チェック
    pub async fn run_quick(&self) -> Option<QuickCheckResult> {
        let backend = self.configured_backend()?;
        self.run_tier(Tier::Quick, quick_slot, |image, cancel| async move {
            backend.quick_check(&image, cancel).await
        })
        .await
    }

    /// 本解析（PDF生成を含む）
    pub async fn run_analyze(&self) -> Option<FullAnalysisResult> {
        let backend = self.configured_backend()?;
        self.run_tier(Tier::Full, full_slot, |image, cancel| async move {
            backend.analyze(&image, cancel).await
        })
        .await
    }

    fn configured_backend(&self) -> Option<&B> {
        if self.backend.is_none() {
            debug!("analysis skipped: base url not configured");
            self.notifier
                .notify(Notice::error("設定エラー", DentiCheckError::NotConfigured.to_string()));
        }
        self.backend.as_ref()
    }

    async fn run_tier<T, F, Fut>(
        &self,
        tier: Tier,
        slot: fn(&mut WorkflowRun) -> &mut TierSlot<T>,
        call: F,
    ) -> Option<T>
    where
        T: Clone,
        F: FnOnce(SelectedImage, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (generation, image, cancel) = {
            let mut run = self.lock();
            let generation = run.generation;
            let Some(image) = run.image.clone() else {
                debug!(%tier, "analysis skipped: no image selected");
                return None;
            };
            let tier_slot = slot(&mut *run);
            if tier_slot.state == TierState::Loading {
                debug!(%tier, "analysis already in flight");
                return None;
            }
            let cancel = CancellationToken::new();
            tier_slot.state = TierState::Loading;
            tier_slot.result = None;
            tier_slot.error = None;
            tier_slot.cancel = Some(cancel.clone());
            (generation, image, cancel)
        };

        // 呼び出し側が待たずに破棄した場合、loading のまま残さない
        let in_flight = InFlight::new(&self.run, move |run: &mut WorkflowRun| {
            if run.generation != generation {
                return;
            }
            let tier_slot = slot(run);
            tier_slot.abort();
            tier_slot.state = TierState::Error;
            tier_slot.error = Some(ABANDONED.to_string());
            debug!(%tier, "analysis abandoned before completion");
        });
        let outcome = call(image, cancel).await;
        in_flight.disarm();

        let mut run = self.lock();
        if run.generation != generation {
            debug!(%tier, "discarding result for replaced image");
            return None;
        }
        let tier_slot = slot(&mut *run);
        tier_slot.cancel = None;
        match outcome {
            Ok(result) => {
                tier_slot.state = TierState::Success;
                tier_slot.result = Some(result.clone());
                Some(result)
            }
            Err(e) => {
                let message = e.to_string();
                tier_slot.state = TierState::Error;
                tier_slot.error = Some(message.clone());
                drop(run);
                warn!(%tier, error = %message, "analysis failed");
                self.notifier.notify(Notice::error(tier_title(tier), message));
                None
            }
        }
    }

    /// 本解析のPDFリポートを取得して開く
    ///
    /// 取得中、またはURLが無い場合は何もしない。
    pub async fn download_report(&self, fetcher: &ReportFetcher, viewers: &ViewerChain) -> Option<DownloadedReport> {
        let target = self
            .lock()
            .full
            .result
            .as_ref()
            .and_then(|r| r.report_url().map(|url| (url.to_string(), r.session_id.clone())));
        let Some((report_url, session_id)) = target else {
            self.notifier.notify(Notice::info("お知らせ", "PDFリポートのURLがありません"));
            return None;
        };
        self.open_report(fetcher, viewers, &report_url, &session_id).await
    }

    /// 指定URLのリポートを取得・検証してビューアで開く
    ///
    /// 結果はすべて通知で伝える。取得中なら何もしない。
    pub async fn open_report(
        &self,
        fetcher: &ReportFetcher,
        viewers: &ViewerChain,
        report_url: &str,
        session_id: &str,
    ) -> Option<DownloadedReport> {
        {
            let mut run = self.lock();
            if run.downloading {
                debug!("report download already in progress");
                return None;
            }
            run.downloading = true;
        }
        let busy = InFlight::new(&self.run, |run: &mut WorkflowRun| run.downloading = false);

        let outcome = fetcher.retrieve(report_url, session_id).await;
        drop(busy);

        match outcome {
            Ok(report) => {
                self.notify_opened(&report, viewers.open(&report.path));
                Some(report)
            }
            Err(e) => {
                let url = fetcher.resolve(report_url);
                warn!(error = %e, %url, "report download failed");
                self.notifier
                    .notify(Notice::error("エラー", format!("{}\nURL: {}", e, url)));
                None
            }
        }
    }

    fn notify_opened(&self, report: &DownloadedReport, opened: Result<OpenedBy>) {
        let saved = format!("PDFを保存しました\n保存先: {}", report.path.display());
        let detail = match opened {
            Ok(OpenedBy::PreferredApp(_)) => saved,
            Ok(OpenedBy::PlatformDefault) => {
                format!("{}\n優先ビューアが見つからないため、既定のアプリで開きました", saved)
            }
            Ok(OpenedBy::GenericShare) => {
                format!("{}\n優先ビューアが見つからないため、共有メニュー（フォルダ）から開いてください", saved)
            }
            Err(e) => format!("{}\n{}", saved, e),
        };
        self.notifier.notify(Notice::info("お知らせ", detail));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn image(name: &str) -> SelectedImage {
        SelectedImage {
            location: PathBuf::from(name),
            file_name: name.to_string(),
            mime_type: "image/jpeg".to_string(),
        }
    }

    #[test]
    fn test_reset_clears_everything_and_bumps_generation() {
        let mut run = WorkflowRun::default();
        run.quick.state = TierState::Success;
        run.full.state = TierState::Error;
        run.full.error = Some("x".into());
        let cancel = CancellationToken::new();
        run.quick.cancel = Some(cancel.clone());

        run.reset_with(image("a.jpg"));

        assert_eq!(run.generation, 1);
        assert_eq!(run.quick.state, TierState::Idle);
        assert_eq!(run.full.state, TierState::Idle);
        assert!(run.full.error.is_none());
        assert!(cancel.is_cancelled());
        assert_eq!(run.image.as_ref().map(|i| i.file_name.as_str()), Some("a.jpg"));
    }

    #[test]
    fn test_can_download_requires_success_and_url() {
        let result: FullAnalysisResult = serde_json::from_str(
            r#"{"sessionId":"s","status":"done","pdfUrl":" ","detections":[]}"#,
        )
        .unwrap();
        let mut snapshot = WorkflowSnapshot {
            image: None,
            quick_state: TierState::Idle,
            quick_result: None,
            quick_error: None,
            full_state: TierState::Success,
            full_result: Some(result.clone()),
            full_error: None,
            downloading: false,
        };
        assert!(!snapshot.can_download_report());

        let mut with_url = result;
        with_url.pdf_url = Some("http://x/reports/a.pdf".into());
        snapshot.full_result = Some(with_url);
        assert!(snapshot.can_download_report());

        snapshot.full_state = TierState::Loading;
        assert!(!snapshot.can_download_report());
    }
}
