//! Auction Vision Common Library
//!
//! 解析ワーカーとCLIで共有される型とIOを持たないロジック

pub mod types;
pub mod error;
pub mod parser;
pub mod prompts;
pub mod aggregate;
pub mod reconcile;
pub mod export;

pub use types::{
    AnalysisResult, BoundingBox, ConfidenceBadge, DedupKey, DetectedItem, ImageSummary,
    StoredEstimate, Totals,
};
pub use error::{Error, Result};
pub use parser::{extract_json, parse_classifier_response};
pub use prompts::build_vision_prompt;
pub use aggregate::{truncate_total, ItemAggregator};
pub use reconcile::{
    apply_edits, reset_to_ai, resolve, state_of, visible_totals, ActiveEstimate, EditRow,
    EstimateState, ManualOverride,
};
