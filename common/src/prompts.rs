//! プロンプト生成モジュール
//!
//! 1枚ずつの増分解析用プロンプト。既出の物品名を渡して再検出を抑える。

/// 既出物品がない場合の表記
const NONE_KNOWN: &str = "none known yet";

/// 増分解析プロンプト生成
///
/// # Arguments
/// * `seen_items` - これまでの画像で採用済みの物品名（発見順）
/// * `dimensions` - 画像の (幅, 高さ)。デコードできなかった場合は None
pub fn build_vision_prompt(seen_items: &[String], dimensions: Option<(u32, u32)>) -> String {
    let existing = if seen_items.is_empty() {
        NONE_KNOWN.to_string()
    } else {
        seen_items.join(", ")
    };

    let size_hint = match dimensions {
        Some((width, height)) if width > 0 && height > 0 => format!(
            "Image resolution: {width}x{height}. \
Calculate bounding boxes relative to this size so that x/y/w/h are normalized between 0 and 1. \
Boxes may overlap when objects stack or occlude each other. \
Double-check coordinates stay within the image frame before returning.\n\n"
        ),
        _ => String::new(),
    };

    format!(
        r#"You are an expert storage auction appraiser working through multiple photos of the same auction.
Treat this image as an incremental pass: only add NEW items that are not already identified from earlier photos.
Existing items (do NOT repeat): {existing}.
When describing items, remember objects seen in previous images so duplicates are excluded.
If an object appears again, ignore it unless there is meaningful new detail to refine brand or pricing.

First determine the image dimensions and place bounding boxes relative to the actual width and height so they stay on each object.
Boxes may overlap if objects overlap in the photo.
{size_hint}Analyze this image and identify any additional distinct objects you can.
For each NEW object:
- name
- brand (if visible or likely)
- confidence (0-1)
- estimated resale price range (low/high USD)
- bounding box for where the object appears in the image as normalized coordinates {{x,y,w,h}} between 0 and 1.

Return STRICT JSON only in this format:
{{
  "items": [
    {{"name":"", "brand":"", "confidence":0.0, "low":0, "high":0, "box":{{"x":0.0,"y":0.0,"w":0.0,"h":0.0}}}}
  ]
}}"#
    )
}
