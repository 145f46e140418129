//! Excel生成（共通ライブラリ）
//!
//! 有効な見積もりを1シートの表として出力する

use super::{source_label, ExportMeta, COLUMNS};
use crate::error::{Error, Result};
use crate::reconcile::ActiveEstimate;
use rust_xlsxwriter::*;

/// 列幅（文字数単位）
const COLUMN_WIDTHS: &[f64] = &[32.0, 20.0, 12.0, 12.0, 12.0, 8.0];

/// Excelをバッファに生成
pub fn generate_excel_buffer(meta: &ExportMeta, estimate: &ActiveEstimate) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    // フォーマット定義
    let label_format = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(0x555555))
        .set_background_color(Color::RGB(0xF5F5F5))
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xAAAAAA));

    let header_format = Format::new()
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_background_color(Color::RGB(0xE5E7EB))
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(0xAAAAAA));

    let text_format = Format::new()
        .set_text_wrap()
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xCCCCCC));

    let hidden_format = text_format.clone().set_font_color(Color::RGB(0x9CA3AF));

    let percent_format = Format::new()
        .set_num_format("0%")
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xCCCCCC));

    let money_format = Format::new()
        .set_num_format("$#,##0.00")
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xCCCCCC));

    let total_format = Format::new()
        .set_bold()
        .set_num_format("$#,##0.00")
        .set_border(FormatBorder::Thin);

    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Estimate")
        .map_err(|e| Error::Export(format!("シート名設定エラー: {}", e)))?;

    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width)
            .map_err(|e| Error::Export(format!("列幅設定エラー: {}", e)))?;
    }

    // オークション情報
    let header_rows = [
        ("Auction", meta.auction_id.as_str()),
        ("Facility", meta.facility_name.as_str()),
        ("Source", source_label(estimate.is_manual)),
    ];
    for (row, (label, value)) in header_rows.iter().enumerate() {
        worksheet.write_string_with_format(row as u32, 0, *label, &label_format)
            .map_err(|e| Error::Export(format!("ラベル書き込みエラー: {}", e)))?;
        worksheet.write_string_with_format(row as u32, 1, *value, &text_format)
            .map_err(|e| Error::Export(format!("値書き込みエラー: {}", e)))?;
    }

    // 表見出し
    let table_row = header_rows.len() as u32 + 1;
    for (col, title) in COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(table_row, col as u16, *title, &header_format)
            .map_err(|e| Error::Export(format!("見出し書き込みエラー: {}", e)))?;
    }

    let mut current_row = table_row + 1;
    for item in &estimate.items {
        let name_format = if item.hidden { &hidden_format } else { &text_format };

        worksheet.write_string_with_format(current_row, 0, item.display_name(), name_format)
            .map_err(|e| Error::Export(format!("値書き込みエラー: {}", e)))?;
        worksheet.write_string_with_format(current_row, 1, item.display_brand(), name_format)
            .map_err(|e| Error::Export(format!("値書き込みエラー: {}", e)))?;
        worksheet.write_number_with_format(current_row, 2, item.confidence, &percent_format)
            .map_err(|e| Error::Export(format!("値書き込みエラー: {}", e)))?;
        worksheet.write_number_with_format(current_row, 3, item.low, &money_format)
            .map_err(|e| Error::Export(format!("値書き込みエラー: {}", e)))?;
        worksheet.write_number_with_format(current_row, 4, item.high, &money_format)
            .map_err(|e| Error::Export(format!("値書き込みエラー: {}", e)))?;
        worksheet.write_string_with_format(current_row, 5, if item.hidden { "yes" } else { "no" }, name_format)
            .map_err(|e| Error::Export(format!("値書き込みエラー: {}", e)))?;

        current_row += 1;
    }

    // 合計行（非表示行を除いた値）
    worksheet.write_string_with_format(current_row, 0, "Total", &label_format)
        .map_err(|e| Error::Export(format!("合計書き込みエラー: {}", e)))?;
    worksheet.write_number_with_format(current_row, 3, estimate.totals.low, &total_format)
        .map_err(|e| Error::Export(format!("合計書き込みエラー: {}", e)))?;
    worksheet.write_number_with_format(current_row, 4, estimate.totals.high, &total_format)
        .map_err(|e| Error::Export(format!("合計書き込みエラー: {}", e)))?;

    // バッファに書き出し
    workbook.save_to_buffer()
        .map_err(|e| Error::Export(format!("Excel保存エラー: {}", e)))
}
