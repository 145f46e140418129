//! CSV生成（共通ライブラリ）

use super::{source_label, ExportMeta, COLUMNS};
use crate::reconcile::ActiveEstimate;

/// 有効な見積もりをCSV文字列へ
///
/// 先頭にオークション情報、続いて物品行、最後に合計行
pub fn render_csv(meta: &ExportMeta, estimate: &ActiveEstimate) -> String {
    let mut lines = Vec::with_capacity(estimate.items.len() + 4);

    lines.push(row(&["auction_id", meta.auction_id.as_str()]));
    lines.push(row(&["facility", meta.facility_name.as_str()]));
    lines.push(row(&["source", source_label(estimate.is_manual)]));
    lines.push(row(COLUMNS));

    for item in &estimate.items {
        let confidence = format!("{:.2}", item.confidence);
        let low = format!("{:.2}", item.low);
        let high = format!("{:.2}", item.high);
        lines.push(row(&[
            item.display_name(),
            item.display_brand(),
            confidence.as_str(),
            low.as_str(),
            high.as_str(),
            if item.hidden { "yes" } else { "no" },
        ]));
    }

    let total_low = format!("{:.2}", estimate.totals.low);
    let total_high = format!("{:.2}", estimate.totals.high);
    lines.push(row(&["Total", "", "", total_low.as_str(), total_high.as_str(), ""]));

    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

fn row(fields: &[&str]) -> String {
    fields.iter().map(|f| escape(f)).collect::<Vec<_>>().join(",")
}

/// RFC 4180 のクオート
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
