//! AI結果と手動上書きの照合
//!
//! 保存レコードから「現在有効な」物品一覧と合計を決める。
//! 手動上書きが空でなければAI結果より優先し、リセットでAI結果へ戻る。

use crate::types::{DetectedItem, StoredEstimate, Totals};
use serde::{Deserialize, Serialize};

/// 表示・出力に使う有効な見積もり
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEstimate {
    pub items: Vec<DetectedItem>,
    pub totals: Totals,
    pub is_manual: bool,
}

/// オークション単位の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateState {
    NoAnalysis,
    AiOnly,
    ManualOverride,
}

/// 編集画面の1行
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditRow {
    pub name: String,
    pub brand: String,
    /// AI値をそのまま引き継ぐ（編集不可）
    pub confidence: f64,
    pub low: f64,
    pub high: f64,
    pub hidden: bool,
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub bbox: Option<crate::types::BoundingBox>,
}

impl From<&DetectedItem> for EditRow {
    fn from(item: &DetectedItem) -> Self {
        Self {
            name: item.name.clone(),
            brand: item.brand.clone(),
            confidence: item.confidence,
            low: item.low,
            high: item.high,
            hidden: item.hidden,
            bbox: item.bbox,
        }
    }
}

/// 新しい手動上書き
#[derive(Debug, Clone, PartialEq)]
pub struct ManualOverride {
    pub items: Vec<DetectedItem>,
    pub totals: Totals,
}

pub fn state_of(stored: Option<&StoredEstimate>) -> EstimateState {
    match stored {
        None => EstimateState::NoAnalysis,
        Some(s) if s.has_manual() => EstimateState::ManualOverride,
        Some(_) => EstimateState::AiOnly,
    }
}

/// 有効な物品一覧と合計を決定
pub fn resolve(stored: &StoredEstimate) -> ActiveEstimate {
    match &stored.manual_items {
        Some(manual) if !manual.is_empty() => {
            let totals = match (stored.manual_total_low, stored.manual_total_high) {
                (Some(low), Some(high)) => Totals { low, high },
                _ => visible_totals(manual),
            };
            ActiveEstimate {
                items: manual.clone(),
                totals,
                is_manual: true,
            }
        }
        _ => ActiveEstimate {
            items: stored.items.clone(),
            totals: Totals {
                low: stored.total_low,
                high: stored.total_high,
            },
            is_manual: false,
        },
    }
}

/// 編集行を確定して手動上書きを作る
///
/// high < low の行は high を low へ引き上げ、行自体にも反映する
pub fn apply_edits(rows: &mut [EditRow]) -> ManualOverride {
    for row in rows.iter_mut() {
        if row.high < row.low {
            row.high = row.low;
        }
    }

    let items: Vec<DetectedItem> = rows
        .iter()
        .map(|row| DetectedItem {
            name: row.name.trim().to_string(),
            brand: row.brand.trim().to_string(),
            confidence: row.confidence,
            low: row.low,
            high: row.high,
            bbox: row.bbox,
            hidden: row.hidden,
        })
        .collect();

    let totals = visible_totals(&items);
    ManualOverride { items, totals }
}

/// 手動上書きを消してAI結果へ戻す（永続化は呼び出し側）
pub fn reset_to_ai(stored: &mut StoredEstimate) -> ActiveEstimate {
    stored.manual_items = None;
    stored.manual_total_low = None;
    stored.manual_total_high = None;
    resolve(stored)
}

/// 非表示でない物品の単純合計
pub fn visible_totals(items: &[DetectedItem]) -> Totals {
    items
        .iter()
        .filter(|item| !item.hidden)
        .fold(Totals::default(), |acc, item| Totals {
            low: acc.low + item.low,
            high: acc.high + item.high,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalysisResult;

    fn ai_record() -> StoredEstimate {
        let result = AnalysisResult {
            items: vec![
                DetectedItem::new("Drill", "DeWalt", 0.8, 40.0, 90.0),
                DetectedItem::new("Sofa", "", 0.5, 100.0, 300.0),
            ],
            total_low: 82,
            total_high: 222,
        };
        StoredEstimate::from_analysis("A-100", "Public Storage", &result)
    }

    fn row(low: f64, high: f64, hidden: bool) -> EditRow {
        EditRow {
            name: "Item".to_string(),
            confidence: 0.5,
            low,
            high,
            hidden,
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_ai_only() {
        let stored = ai_record();
        let active = resolve(&stored);
        assert!(!active.is_manual);
        assert_eq!(active.items.len(), 2);
        assert_eq!(active.totals, Totals { low: 82.0, high: 222.0 });
    }

    #[test]
    fn test_manual_precedence() {
        let mut stored = ai_record();
        stored.manual_items = Some(vec![DetectedItem::new("Drill", "DeWalt", 0.8, 60.0, 70.0)]);
        stored.manual_total_low = Some(1000.0);
        stored.manual_total_high = Some(2000.0);

        let active = resolve(&stored);
        assert!(active.is_manual);
        assert_eq!(active.items.len(), 1);
        assert_eq!(active.totals, Totals { low: 1000.0, high: 2000.0 });
    }

    #[test]
    fn test_manual_totals_computed_when_missing() {
        let mut stored = ai_record();
        let mut hidden = DetectedItem::new("Sofa", "", 0.5, 500.0, 900.0);
        hidden.hidden = true;
        stored.manual_items = Some(vec![hidden, DetectedItem::new("Lamp", "", 0.5, 10.0, 20.0)]);
        stored.manual_total_low = Some(5.0);

        let active = resolve(&stored);
        assert!(active.is_manual);
        assert_eq!(active.totals, Totals { low: 10.0, high: 20.0 });
    }

    #[test]
    fn test_empty_manual_list_falls_back_to_ai() {
        let mut stored = ai_record();
        stored.manual_items = Some(Vec::new());
        stored.manual_total_low = Some(1.0);
        stored.manual_total_high = Some(2.0);

        let active = resolve(&stored);
        assert!(!active.is_manual);
        assert_eq!(active.totals.low, 82.0);
    }

    #[test]
    fn test_reset_reverts_cleanly() {
        let mut stored = ai_record();
        stored.manual_items = Some(vec![DetectedItem::new("Chair", "", 0.5, 1.0, 2.0)]);
        stored.manual_total_low = Some(1.0);
        stored.manual_total_high = Some(2.0);

        let reset = reset_to_ai(&mut stored);
        assert!(!reset.is_manual);
        assert_eq!(stored.manual_items, None);
        assert_eq!(stored.manual_total_low, None);

        let active = resolve(&stored);
        assert!(!active.is_manual);
        assert_eq!(active.items, ai_record().items);
        assert_eq!(active.totals, Totals { low: 82.0, high: 222.0 });
    }

    #[test]
    fn test_hidden_excluded_but_retained() {
        let mut rows = vec![row(500.0, 900.0, true), row(10.0, 20.0, false)];
        let manual = apply_edits(&mut rows);
        assert_eq!(manual.items.len(), 2);
        assert!(manual.items[0].hidden);
        assert_eq!(manual.totals, Totals { low: 10.0, high: 20.0 });

        rows[0].hidden = false;
        let manual = apply_edits(&mut rows);
        assert_eq!(manual.totals, Totals { low: 510.0, high: 920.0 });
    }

    #[test]
    fn test_high_below_low_corrected_before_sum() {
        let mut rows = vec![row(100.0, 50.0, false)];
        let manual = apply_edits(&mut rows);
        assert_eq!(rows[0].high, 100.0);
        assert_eq!(manual.items[0].high, 100.0);
        assert_eq!(manual.totals, Totals { low: 100.0, high: 100.0 });
    }

    #[test]
    fn test_confidence_carried_through() {
        let item = DetectedItem::new("TV", "Sony", 0.73, 50.0, 80.0);
        let mut rows = vec![EditRow::from(&item)];
        rows[0].low = 60.0;
        let manual = apply_edits(&mut rows);
        assert_eq!(manual.items[0].confidence, 0.73);
        assert_eq!(manual.items[0].low, 60.0);
    }

    #[test]
    fn test_state_machine() {
        assert_eq!(state_of(None), EstimateState::NoAnalysis);
        let mut stored = ai_record();
        assert_eq!(state_of(Some(&stored)), EstimateState::AiOnly);
        stored.manual_items = Some(vec![DetectedItem::new("Chair", "", 0.5, 1.0, 2.0)]);
        assert_eq!(state_of(Some(&stored)), EstimateState::ManualOverride);
        reset_to_ai(&mut stored);
        assert_eq!(state_of(Some(&stored)), EstimateState::AiOnly);
    }
}
