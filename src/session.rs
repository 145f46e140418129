//! 解析セッションモジュール
//!
//! 実行中の解析イベントを受け取り、状態表示と保存の可否を決める。
//! 画像ごとの結果キャッシュもここが所有し、ワーカーは触れない。

use crate::error::{AuctionVisionError, Result};
use crate::pipeline::RunEvent;
use crate::store::ResultStore;
use auction_vision_common::{
    apply_edits, reset_to_ai, resolve, state_of, ActiveEstimate, AnalysisResult, EditRow,
    EstimateState, ImageSummary,
};
use std::collections::HashMap;
use tracing::{info, warn};

/// オークション → 画像URL → 画像ごとの結果
#[derive(Debug, Default)]
pub struct SummaryCache {
    by_auction: HashMap<String, HashMap<String, ImageSummary>>,
}

impl SummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, auction_id: &str, summary: ImageSummary) {
        self.by_auction
            .entry(auction_id.to_string())
            .or_default()
            .insert(summary.url.clone(), summary);
    }

    pub fn get(&self, auction_id: &str, url: &str) -> Option<&ImageSummary> {
        self.by_auction.get(auction_id)?.get(url)
    }

    /// 画像番号順
    pub fn list(&self, auction_id: &str) -> Vec<&ImageSummary> {
        let mut summaries: Vec<&ImageSummary> = self
            .by_auction
            .get(auction_id)
            .map(|m| m.values().collect())
            .unwrap_or_default();
        summaries.sort_by_key(|s| s.index);
        summaries
    }

    pub fn clear(&mut self, auction_id: &str) {
        self.by_auction.remove(auction_id);
    }

    pub fn is_empty(&self) -> bool {
        self.by_auction.values().all(|m| m.is_empty())
    }
}

/// 解析実行の最終結果
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// 全画像成功。保存済み
    Saved(AnalysisResult),
    /// 失敗画像あり。保存しない
    NotSaved {
        result: AnalysisResult,
        failed_images: Vec<usize>,
    },
    /// キャンセル。保存データは変更なし
    Cancelled,
}

#[derive(Debug)]
struct TrackedRun {
    auction_id: String,
    facility_name: String,
    failed_images: Vec<usize>,
}

/// 保存先と画像キャッシュを持つ対話セッション
pub struct AnalysisSession<S: ResultStore> {
    store: S,
    summaries: SummaryCache,
    active: Option<TrackedRun>,
    status: String,
}

impl<S: ResultStore> AnalysisSession<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            summaries: SummaryCache::new(),
            active: None,
            status: String::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn summaries(&self) -> &SummaryCache {
        &self.summaries
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// 解析の追跡を始める。同時に追跡できるのは1件だけ
    pub fn start_tracking(&mut self, auction_id: &str, facility_name: &str) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(AuctionVisionError::RunInProgress(active.auction_id.clone()));
        }

        self.summaries.clear(auction_id);
        self.active = Some(TrackedRun {
            auction_id: auction_id.to_string(),
            facility_name: facility_name.to_string(),
            failed_images: Vec::new(),
        });
        self.status = "Analyzing images...".to_string();
        Ok(())
    }

    /// 終端イベントなしでワーカーが消えた場合の後始末
    pub fn abandon(&mut self) {
        if let Some(active) = self.active.take() {
            warn!(auction_id = %active.auction_id, "analysis ended without a final event");
            self.status = "Analysis stopped unexpectedly; results not saved".to_string();
        }
    }

    /// イベントを反映する。終端イベントなら結果を返す
    pub fn handle_event(&mut self, event: RunEvent) -> Result<Option<RunOutcome>> {
        let tracked = self
            .active
            .as_ref()
            .is_some_and(|active| active.auction_id == event.auction_id());
        if !tracked {
            warn!(auction_id = event.auction_id(), "ignoring event for an untracked run");
            return Ok(None);
        }

        match event {
            RunEvent::Progress {
                auction_id,
                current,
                total,
                summary,
                ..
            } => {
                self.summaries.insert(&auction_id, summary);
                self.status = format!("Analyzing images... ({}/{})", current, total);
                Ok(None)
            }
            RunEvent::ImageFailed {
                index,
                total,
                stage,
                reason,
                ..
            } => {
                if let Some(active) = self.active.as_mut() {
                    active.failed_images.push(index);
                }
                self.status = format!("Image {}/{} failed ({}): {}", index, total, stage, reason);
                Ok(None)
            }
            RunEvent::Cancelled { auction_id } => {
                self.active = None;
                info!(auction_id = %auction_id, "analysis canceled, store untouched");
                self.status = "Analysis canceled".to_string();
                Ok(Some(RunOutcome::Cancelled))
            }
            RunEvent::Completed { auction_id, result } => {
                let Some(active) = self.active.take() else {
                    return Ok(None);
                };

                if !active.failed_images.is_empty() {
                    let failed = active
                        .failed_images
                        .iter()
                        .map(|i| i.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    warn!(auction_id = %auction_id, failed = %failed, "analysis had errors, not saved");
                    self.status = format!(
                        "Analysis finished with errors (images {}); results not saved, re-run analysis",
                        failed
                    );
                    return Ok(Some(RunOutcome::NotSaved {
                        result,
                        failed_images: active.failed_images,
                    }));
                }

                // 新しいAI結果が正になるので手動上書きは破棄
                self.store.replace_analysis(&auction_id, &result, &active.facility_name)?;

                info!(auction_id = %auction_id, items = result.items.len(), "analysis saved");
                self.status = format!(
                    "Saved: {} items, ${} - ${}",
                    result.items.len(),
                    result.total_low,
                    result.total_high
                );
                Ok(Some(RunOutcome::Saved(result)))
            }
        }
    }

    pub fn estimate_state(&self, auction_id: &str) -> Result<EstimateState> {
        Ok(state_of(self.store.load(auction_id)?.as_ref()))
    }

    /// 表示・出力に使う見積もり
    pub fn active_estimate(&self, auction_id: &str) -> Result<Option<ActiveEstimate>> {
        Ok(self.store.load(auction_id)?.as_ref().map(resolve))
    }

    /// 編集行を手動上書きとして保存
    pub fn save_edits(&mut self, auction_id: &str, rows: &mut [EditRow]) -> Result<ActiveEstimate> {
        let manual = apply_edits(rows);
        self.store.save_manual(auction_id, &manual)?;
        self.active_estimate(auction_id)?
            .ok_or_else(|| AuctionVisionError::NotFound(auction_id.to_string()))
    }

    /// 手動上書きを消してAI結果へ戻す
    pub fn reset_to_ai(&mut self, auction_id: &str) -> Result<ActiveEstimate> {
        let mut stored = self
            .store
            .load(auction_id)?
            .ok_or_else(|| AuctionVisionError::NotFound(auction_id.to_string()))?;
        self.store.clear_manual(auction_id)?;
        Ok(reset_to_ai(&mut stored))
    }
}
