//! DentiCheck Common Library
//!
//! CLIと将来のフロントエンドで共有される型とユーティリティ。
//! ネットワーク・ファイルI/Oは持たない。

pub mod types;
pub mod error;
pub mod parser;
pub mod interpret;
pub mod feed;

pub use types::{
    BoundingBox, Detection, DetectionLabel, Finding, FullAnalysisResult, InterpretedResult,
    QuickCheckResult, QuickStatus, RagContext, RagSource, RiskLevel,
};
pub use error::{Error, Result};
pub use parser::{parse_analyze_response, parse_quick_response};
pub use interpret::{
    build_action_list, build_problems, classify_risk, interpret, visit_need, Interpretation,
    ProblemCard, RiskBadge, RiskTier, VisitNeed, VisitUrgency, FALLBACK_ACTIONS,
};
pub use feed::{FeedProjection, FeedView, LikeToggle, Post, PostTag};
