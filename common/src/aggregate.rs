//! 画像横断の物品集計
//!
//! 1回の解析実行の中で、画像ごとの検出結果を発見順に積み上げる:
//! - 名前+ブランドのキーで重複を排除（先に見つかった方を採用）
//! - 信頼度で重み付けした low/high 合計を浮動小数のまま累積
//! - 整数化は `finish` 時の切り捨てのみ

use crate::types::{AnalysisResult, DedupKey, DetectedItem, Totals};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct ItemAggregator {
    seen_keys: HashSet<String>,
    seen_names: Vec<String>,
    items: Vec<DetectedItem>,
    total_low: f64,
    total_high: f64,
}

impl ItemAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分類器へ「既出」として渡す名前（発見順）
    pub fn seen_names(&self) -> &[String] {
        &self.seen_names
    }

    /// 1枚分の検出結果を取り込み、新規に採用した件数を返す
    pub fn merge(&mut self, detected: &[DetectedItem]) -> usize {
        let mut added = 0;

        for item in detected {
            let key = item.dedup_key();

            if let DedupKey::Key(k) = &key {
                if self.seen_keys.contains(k) {
                    continue;
                }
            }

            self.total_low += item.low * item.confidence;
            self.total_high += item.high * item.confidence;

            if let DedupKey::Key(k) = key {
                self.seen_keys.insert(k);
                self.seen_names.push(item.name.clone());
            }

            self.items.push(item.clone());
            added += 1;
        }

        added
    }

    pub fn items(&self) -> &[DetectedItem] {
        &self.items
    }

    /// 切り捨て前の累積値
    pub fn running_totals(&self) -> Totals {
        Totals {
            low: self.total_low,
            high: self.total_high,
        }
    }

    pub fn finish(self) -> AnalysisResult {
        AnalysisResult {
            total_low: truncate_total(self.total_low),
            total_high: truncate_total(self.total_high),
            items: self.items,
        }
    }
}

/// 0方向への切り捨て
pub fn truncate_total(value: f64) -> i64 {
    value.trunc() as i64
}
