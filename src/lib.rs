//! Auction Vision
//!
//! オークション写真を1枚ずつ分類し、重複を除いた物品一覧と
//! 信頼度加重の見積もりを作る。手動上書きと保存も扱う。

pub mod annotator;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod editor;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod pipeline;
pub mod session;
pub mod store;

pub use error::{AuctionVisionError, Result};
pub use pipeline::{AnalysisRun, CancelHandle, FailureStage, RunEvent, RunHandle};
pub use session::{AnalysisSession, RunOutcome, SummaryCache};
pub use store::{JsonResultStore, RecentEstimate, ResultStore};
