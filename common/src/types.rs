//! 査定データの型定義
//!
//! CLIと解析ワーカーで共有される型:
//! - DetectedItem: 1つの査定対象物
//! - AnalysisResult: 1回の解析実行の最終出力
//! - StoredEstimate: 永続化されたAI結果と手動上書き
//! - ImageSummary: 画像ごとの検出結果（セッション内のみ）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 表示用の既定名
pub const UNKNOWN_ITEM: &str = "Unknown item";
pub const UNKNOWN_BRAND: &str = "Unknown brand";

/// 正規化矩形（画像サイズに対する0〜1の比率）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// 査定対象物
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectedItem {
    pub name: String,
    pub brand: String,
    pub confidence: f64,
    pub low: f64,
    pub high: f64,
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    /// 手動編集でのみ使用。合計から除外するが削除はしない
    pub hidden: bool,
}

impl DetectedItem {
    /// high >= low を保証して生成
    pub fn new(name: &str, brand: &str, confidence: f64, low: f64, high: f64) -> Self {
        let mut item = Self {
            name: name.trim().to_string(),
            brand: brand.trim().to_string(),
            confidence,
            low,
            high,
            bbox: None,
            hidden: false,
        };
        item.clamp_high();
        item
    }

    pub fn with_box(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// high が low を下回る場合は low まで引き上げる
    pub fn clamp_high(&mut self) {
        if self.high < self.low {
            self.high = self.low;
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { UNKNOWN_ITEM } else { &self.name }
    }

    pub fn display_brand(&self) -> &str {
        if self.brand.is_empty() { UNKNOWN_BRAND } else { &self.brand }
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::of(&self.name, &self.brand)
    }
}

/// 画像間の重複判定キー
///
/// 名前が空の場合は `NoKey` となり、重複排除の対象外
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Key(String),
    NoKey,
}

impl DedupKey {
    pub fn of(name: &str, brand: &str) -> Self {
        let name = name.trim();
        if name.is_empty() {
            return DedupKey::NoKey;
        }
        DedupKey::Key(format!("{}|{}", name.to_lowercase(), brand.trim().to_lowercase()))
    }
}

/// 信頼度バッジ（一覧表示用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBadge {
    High,
    Medium,
    Low,
}

impl ConfidenceBadge {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ConfidenceBadge::High
        } else if confidence >= 0.5 {
            ConfidenceBadge::Medium
        } else {
            ConfidenceBadge::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceBadge::High => "High",
            ConfidenceBadge::Medium => "Medium",
            ConfidenceBadge::Low => "Low",
        }
    }
}

/// 金額レンジ
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub low: f64,
    pub high: f64,
}

/// 1回の解析実行の結果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 発見順の重複なし一覧
    pub items: Vec<DetectedItem>,
    /// 信頼度加重合計（整数へ切り捨て）
    pub total_low: i64,
    pub total_high: i64,
}

/// オークション単位の保存レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEstimate {
    pub auction_id: String,
    #[serde(default)]
    pub facility_name: String,
    #[serde(default)]
    pub items: Vec<DetectedItem>,
    #[serde(default)]
    pub total_low: f64,
    #[serde(default)]
    pub total_high: f64,
    #[serde(default)]
    pub manual_items: Option<Vec<DetectedItem>>,
    #[serde(default)]
    pub manual_total_low: Option<f64>,
    #[serde(default)]
    pub manual_total_high: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl StoredEstimate {
    pub fn from_analysis(auction_id: &str, facility_name: &str, result: &AnalysisResult) -> Self {
        Self {
            auction_id: auction_id.to_string(),
            facility_name: facility_name.to_string(),
            items: result.items.clone(),
            total_low: result.total_low as f64,
            total_high: result.total_high as f64,
            manual_items: None,
            manual_total_low: None,
            manual_total_high: None,
            updated_at: Utc::now(),
        }
    }

    pub fn has_manual(&self) -> bool {
        self.manual_items.as_ref().is_some_and(|items| !items.is_empty())
    }
}

/// 画像ごとの検出結果
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSummary {
    pub url: String,
    /// 1始まりの画像番号
    pub index: usize,
    /// この画像で検出された物品
    pub items: Vec<DetectedItem>,
    /// 枠線描画済みのPNG
    pub annotated: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_high_up_to_low() {
        let item = DetectedItem::new("Drill", "DeWalt", 0.9, 100.0, 50.0);
        assert_eq!(item.low, 100.0);
        assert_eq!(item.high, 100.0);
    }

    #[test]
    fn test_display_fallbacks() {
        let item = DetectedItem::default();
        assert_eq!(item.display_name(), "Unknown item");
        assert_eq!(item.display_brand(), "Unknown brand");
    }

    #[test]
    fn test_dedup_key_lowercases() {
        let a = DedupKey::of("Cordless Drill", "DeWalt");
        let b = DedupKey::of("cordless drill ", "DEWALT");
        assert_eq!(a, b);
        assert_eq!(a, DedupKey::Key("cordless drill|dewalt".to_string()));
    }

    #[test]
    fn test_dedup_key_empty_name() {
        assert_eq!(DedupKey::of("", "Sony"), DedupKey::NoKey);
        assert_eq!(DedupKey::of("   ", ""), DedupKey::NoKey);
    }

    #[test]
    fn test_confidence_badge_thresholds() {
        assert_eq!(ConfidenceBadge::from_confidence(0.8), ConfidenceBadge::High);
        assert_eq!(ConfidenceBadge::from_confidence(0.79), ConfidenceBadge::Medium);
        assert_eq!(ConfidenceBadge::from_confidence(0.5), ConfidenceBadge::Medium);
        assert_eq!(ConfidenceBadge::from_confidence(0.49), ConfidenceBadge::Low);
    }

    #[test]
    fn test_item_deserialize_box_and_defaults() {
        let json = r#"{"name":"TV","brand":"Samsung","confidence":0.7,"low":80,"high":150,
            "box":{"x":0.1,"y":0.2,"w":0.3,"h":0.4}}"#;
        let item: DetectedItem = serde_json::from_str(json).expect("デシリアライズ失敗");
        assert_eq!(item.name, "TV");
        assert!(!item.hidden);
        assert_eq!(item.bbox, Some(BoundingBox { x: 0.1, y: 0.2, w: 0.3, h: 0.4 }));
    }

    #[test]
    fn test_item_serialize_uses_box_key() {
        let item = DetectedItem::new("Lamp", "", 0.5, 5.0, 10.0)
            .with_box(BoundingBox { x: 0.0, y: 0.0, w: 1.0, h: 1.0 });
        let json = serde_json::to_string(&item).expect("シリアライズ失敗");
        assert!(json.contains("\"box\":{"));
        assert!(json.contains("\"hidden\":false"));
    }

    #[test]
    fn test_has_manual_requires_non_empty_list() {
        let mut stored = StoredEstimate::from_analysis("a1", "", &AnalysisResult::default());
        assert!(!stored.has_manual());
        stored.manual_items = Some(Vec::new());
        assert!(!stored.has_manual());
        stored.manual_items = Some(vec![DetectedItem::new("Chair", "", 0.5, 1.0, 2.0)]);
        assert!(stored.has_manual());
    }
}
