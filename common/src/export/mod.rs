//! Export core modules shared by the CLI writers.
//!
//! 入力は照合済み（resolve後）の有効な見積もりのみ。

pub mod csv_core;

#[cfg(feature = "excel")]
pub mod excel_core;

/// 出力ヘッダー用のオークション情報
#[derive(Debug, Clone, Default)]
pub struct ExportMeta {
    pub auction_id: String,
    pub facility_name: String,
}

/// 表の列見出し
pub const COLUMNS: &[&str] = &["Name", "Brand", "Confidence", "Low", "High", "Hidden"];

/// 見積もりの出所ラベル
pub fn source_label(is_manual: bool) -> &'static str {
    if is_manual { "manual" } else { "ai" }
}
