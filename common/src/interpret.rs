//! 本解析結果の解釈（CLI/GUI共通）
//!
//! サーバーから受け取ったFullAnalysisResultを表示用に変換する純粋関数群:
//! - リスク分類（RED/YELLOW/その他）
//! - 問題カード（検出ラベル優先、なければLLM所見）最大3件
//! - やるべきこと（ケアガイド優先 + 固定アクション）最大4件
//! - 通院の必要性（口腔病変の検出はリスクレベルより優先）

use crate::types::{Detection, DetectionLabel, Finding, FullAnalysisResult, RiskLevel};
use serde::Serialize;
use std::collections::HashSet;

const MAX_PROBLEMS: usize = 3;
const MAX_ACTIONS: usize = 4;

/// サーバー側のケアガイドが足りない時の固定アクション
pub const FALLBACK_ACTIONS: [&str; 4] = [
    "1日2〜3回、2分以上やさしく歯を磨きましょう。",
    "デンタルフロスまたは歯間ブラシを1日1回使いましょう。",
    "糖分の摂取を控え、食後は水で口をすすぎましょう。",
    "1〜2週間以内に歯科検診の予約を入れましょう。",
];

const NO_SUMMARY: &str = "歯科での追加検診をおすすめします。";

/// 表示用リスク区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    High,
    Medium,
    Low,
}

/// リスクバッジ（表示ラベル + スタイルタグ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskBadge {
    pub tier: RiskTier,
    pub label: &'static str,
    pub style: &'static str,
}

/// 問題カード
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemCard {
    pub title: String,
    pub reason: String,
    pub action: String,
}

/// 通院の緊急度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitUrgency {
    Urgent,
    Recommended,
    Routine,
}

impl VisitUrgency {
    pub fn label(&self) -> &'static str {
        match self {
            VisitUrgency::Urgent => "緊急",
            VisitUrgency::Recommended => "推奨",
            VisitUrgency::Routine => "経過観察",
        }
    }
}

/// 通院の必要性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VisitNeed {
    pub urgency: VisitUrgency,
    pub message: &'static str,
}

/// 表示用にまとめた解釈結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interpretation {
    pub risk: RiskBadge,
    pub summary: String,
    pub problems: Vec<ProblemCard>,
    pub actions: Vec<String>,
    pub visit: VisitNeed,
    pub disclaimer: Vec<String>,
}

/// リスクレベルを表示用に分類
///
/// RED → 高, YELLOW → 中, それ以外（GREEN・未設定・未知）→ 低
pub fn classify_risk(level: Option<RiskLevel>) -> RiskBadge {
    match level {
        Some(RiskLevel::Red) => RiskBadge {
            tier: RiskTier::High,
            label: "高",
            style: "danger",
        },
        Some(RiskLevel::Yellow) => RiskBadge {
            tier: RiskTier::Medium,
            label: "中",
            style: "warning",
        },
        _ => RiskBadge {
            tier: RiskTier::Low,
            label: "低",
            style: "success",
        },
    }
}

/// 検出ラベルに対応する定型カード
pub fn problem_from_label(label: DetectionLabel) -> Option<ProblemCard> {
    let (title, reason, action) = match label {
        DetectionLabel::Caries => (
            "虫歯の疑い",
            "モデルが虫歯の可能性がある領域を検出しました。",
            "糖分の摂取を控え、歯科検診を予約しましょう。",
        ),
        DetectionLabel::Tartar => (
            "歯石・プラークの疑い",
            "歯肉の境目付近に沈着物が検出されました。",
            "スケーリングと定期クリーニングの相談をおすすめします。",
        ),
        DetectionLabel::OralCancer => (
            "口腔病変の疑い",
            "異常な領域が検出されたため、臨床での確認が必要です。",
            "できるだけ早く歯科・口腔外科を受診してください。",
        ),
        DetectionLabel::Normal | DetectionLabel::Unknown => return None,
    };

    Some(ProblemCard {
        title: title.to_string(),
        reason: reason.to_string(),
        action: action.to_string(),
    })
}

/// 問題カードを構築
///
/// 検出ラベルを出現順に重複除去して定型カードへ変換する。
/// 1件も該当しなければLLM所見（先頭3件）から汎用カードを作る。
pub fn build_problems(detections: &[Detection], findings: &[Finding]) -> Vec<ProblemCard> {
    let mut seen = HashSet::new();
    let from_detection: Vec<ProblemCard> = detections
        .iter()
        .map(|d| d.label)
        .filter(|label| seen.insert(*label))
        .filter_map(problem_from_label)
        .take(MAX_PROBLEMS)
        .collect();

    if !from_detection.is_empty() {
        return from_detection;
    }

    findings
        .iter()
        .take(MAX_PROBLEMS)
        .enumerate()
        .map(|(idx, f)| ProblemCard {
            title: if f.title.is_empty() {
                format!("問題 {}", idx + 1)
            } else {
                f.title.clone()
            },
            reason: if f.detail.is_empty() {
                "追加の確認をおすすめします。".to_string()
            } else {
                f.detail.clone()
            },
            action: "専門医の診療で正確な診断を受けてください。".to_string(),
        })
        .collect()
}

/// やるべきことリストを構築
///
/// ケアガイドを trim して空行を除き、固定アクションと合わせて
/// 完全一致で重複除去した後、先頭4件に切り詰める。
pub fn build_action_list(care_guide: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    care_guide
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .chain(FALLBACK_ACTIONS.iter().copied())
        .filter(|line| seen.insert(*line))
        .take(MAX_ACTIONS)
        .map(str::to_string)
        .collect()
}

/// 通院の必要性を判定
///
/// oral_cancer の検出があればリスクレベルに関係なく「緊急」。
pub fn visit_need(level: Option<RiskLevel>, detections: &[Detection]) -> VisitNeed {
    if detections.iter().any(|d| d.label == DetectionLabel::OralCancer) {
        return VisitNeed {
            urgency: VisitUrgency::Urgent,
            message: "口腔病変の疑いがあるため、早めの対面診療が必要です。",
        };
    }

    match level {
        Some(RiskLevel::Red) | Some(RiskLevel::Yellow) => VisitNeed {
            urgency: VisitUrgency::Recommended,
            message: "検出された所見から、歯科の受診をおすすめします。",
        },
        _ => VisitNeed {
            urgency: VisitUrgency::Routine,
            message: "高リスクの兆候は大きくありませんが、定期検診を続けましょう。",
        },
    }
}

/// 本解析結果を表示用にまとめて解釈
pub fn interpret(result: &FullAnalysisResult) -> Interpretation {
    let llm = &result.interpretation;
    let summary = llm.summary.trim();

    Interpretation {
        risk: classify_risk(llm.risk_level),
        summary: if summary.is_empty() {
            NO_SUMMARY.to_string()
        } else {
            summary.to_string()
        },
        problems: build_problems(&result.detections, &llm.findings),
        actions: build_action_list(&llm.care_guide),
        visit: visit_need(llm.risk_level, &result.detections),
        disclaimer: llm.disclaimer.clone(),
    }
}
