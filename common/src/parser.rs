//! 解析サーバーレスポンスパーサー
//!
//! 本文が空、またはJSONとして解釈できない場合はエラーとする。
//! HTTPステータスの判定は呼び出し側の責務。

use crate::error::{Error, Result};
use crate::types::{FullAnalysisResult, QuickCheckResult};
use serde::de::DeserializeOwned;

fn parse_body<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyBody);
    }
    serde_json::from_str(trimmed)
        .map_err(|e| Error::Parse(format!("{} JSONパースエラー: {}", what, e)))
}

/// 簡易チェックのレスポンスをパース
///
/// # Arguments
/// * `body` - レスポンス本文
///
/// # Returns
/// * `Ok(QuickCheckResult)` - パース成功
/// * `Err` - 本文が空かパース失敗
pub fn parse_quick_response(body: &str) -> Result<QuickCheckResult> {
    parse_body(body, "簡易チェック")
}

/// 本解析のレスポンスをパース
pub fn parse_analyze_response(body: &str) -> Result<FullAnalysisResult> {
    parse_body(body, "AI解析")
}
