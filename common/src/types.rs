//! AIチェック結果の型定義
//!
//! 解析サーバーから受け取るレスポンスの型:
//! - QuickCheckResult: 簡易チェック（検出結果のみ）
//! - FullAnalysisResult: 本解析（検出 + RAG + LLM解釈 + PDFリポートURL）
//!
//! いずれも受信後は読み取り専用として扱う。

use serde::{Deserialize, Serialize};

/// 検出ラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionLabel {
    Caries,
    Tartar,
    OralCancer,
    Normal,
    /// 未知のラベル（問題カードでは無視される）
    #[serde(other)]
    Unknown,
}

impl DetectionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionLabel::Caries => "caries",
            DetectionLabel::Tartar => "tartar",
            DetectionLabel::OralCancer => "oral_cancer",
            DetectionLabel::Normal => "normal",
            DetectionLabel::Unknown => "unknown",
        }
    }
}

/// 検出領域（画像座標）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "w")]
    pub width: f64,
    #[serde(rename = "h")]
    pub height: f64,
}

/// 1件の検出結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: DetectionLabel,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub bbox: BoundingBox,
}

/// 簡易チェックのステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickStatus {
    QualityFailed,
    Done,
    Error,
}

/// 簡易チェック結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickCheckResult {
    pub session_id: String,
    pub status: QuickStatus,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// リスクレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Green,
    Yellow,
    Red,
    #[serde(other)]
    Other,
}

/// RAG参照文献
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSource {
    pub source: String,
    pub score: f64,
    pub snippet: String,
}

/// RAGコンテキスト
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RagContext {
    pub top_k: u32,
    pub sources: Vec<RagSource>,
    pub used_fallback: bool,
}

/// LLMによる所見
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Finding {
    pub title: String,
    pub detail: String,
    pub evidence: Vec<String>,
}

/// LLM解釈ブロック
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterpretedResult {
    pub risk_level: Option<RiskLevel>,
    pub summary: String,
    pub findings: Vec<Finding>,
    pub care_guide: Vec<String>,
    pub disclaimer: Vec<String>,
}

/// 本解析結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullAnalysisResult {
    pub session_id: String,

    #[serde(default)]
    pub status: String,

    /// 生成されたPDFリポートのURL（ない場合はダウンロード不可）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,

    #[serde(default)]
    pub detections: Vec<Detection>,

    #[serde(default)]
    pub rag: RagContext,

    #[serde(default, rename = "llmResult")]
    pub interpretation: InterpretedResult,
}

impl FullAnalysisResult {
    /// 空白を除いたリポートURL（空文字はNone）
    pub fn report_url(&self) -> Option<&str> {
        self.pdf_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}
