//! エクスポートモジュール
//!
//! 照合済みの有効な見積もりをCSV/Excelファイルへ書き出す。

use crate::cli::ExportFormat;
use crate::error::Result;
use auction_vision_common::export::csv_core::render_csv;
use auction_vision_common::export::excel_core::generate_excel_buffer;
use auction_vision_common::export::ExportMeta;
use auction_vision_common::ActiveEstimate;
use std::path::{Path, PathBuf};

/// ディレクトリまたは拡張子なしの指定なら `<auction_id>.<ext>` を付ける
pub fn output_path_for_format(output: &Path, auction_id: &str, format: ExportFormat) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.join(format!("{}.{}", file_stem_for(auction_id), format.extension()))
    } else {
        output.to_path_buf()
    }
}

/// ファイル名に使えない文字を置き換える
fn file_stem_for(auction_id: &str) -> String {
    let stem: String = auction_id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "estimate".to_string()
    } else {
        stem
    }
}

/// 書き出したファイルのパスを返す
pub fn export_estimate(
    meta: &ExportMeta,
    estimate: &ActiveEstimate,
    format: ExportFormat,
    output: &Path,
) -> Result<PathBuf> {
    let path = output_path_for_format(output, &meta.auction_id, format);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    match format {
        ExportFormat::Csv => {
            std::fs::write(&path, render_csv(meta, estimate))?;
        }
        ExportFormat::Excel => {
            let buffer = generate_excel_buffer(meta, estimate)?;
            std::fs::write(&path, buffer)?;
        }
    }

    Ok(path)
}

/// 描画済み画像を `<dir>/<auction_id>-<index>.png` に保存し、保存件数を返す
pub fn write_annotated_images<'a>(
    dir: &Path,
    auction_id: &str,
    summaries: impl IntoIterator<Item = &'a auction_vision_common::ImageSummary>,
) -> Result<usize> {
    std::fs::create_dir_all(dir)?;
    let stem = file_stem_for(auction_id);
    let mut written = 0;
    for summary in summaries {
        if let Some(png) = &summary.annotated {
            std::fs::write(dir.join(format!("{}-{:02}.png", stem, summary.index)), png)?;
            written += 1;
        }
    }
    Ok(written)
}
