use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 期限内に終わらなかった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// 期限切れ（トークンもキャンセルされる）
    Elapsed,
    /// 外部からキャンセルされた
    Cancelled,
}

/// 期限とキャンセルトークン付きで future を実行
///
/// 期限切れ・キャンセル時は future を drop して中断する。
pub async fn with_deadline<F, T>(
    fut: F,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<T, Interrupted>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        _ = tokio::time::sleep(deadline) => {
            cancel.cancel();
            Err(Interrupted::Elapsed)
        }
        out = fut => Ok(out),
    }
}
