//! 分類器レスポンスパーサー
//!
//! ビジョンモデルの応答テキストからJSONを抽出し、
//! 型付きの DetectedItem に検証・変換する

use crate::error::{Error, Result};
use crate::types::{BoundingBox, DetectedItem};
use regex::Regex;
use serde_json::Value;

lazy_static::lazy_static! {
    // "$1,200.50" や "about 40" から数値部分を拾う
    static ref NUMBER_RE: Regex = Regex::new(r"-?\d+(?:\.\d+)?").unwrap();
}

/// APIレスポンスからJSON部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` または ``` ... ``` ブロック
/// 2. `{` / `[` のうち先に現れる方から対応する最後の `}` / `]` まで
/// 3. 2がJSONとして読めなければもう一方の括弧で切り出す
/// 4. エラー
///
/// # Examples
/// ```
/// use auction_vision_common::extract_json;
///
/// let response = "Sure: {\"items\": []}";
/// assert_eq!(extract_json(response).unwrap(), "{\"items\": []}");
///
/// let response = "Found 1 item [photo 3]: {\"items\": []}";
/// assert_eq!(extract_json(response).unwrap(), "{\"items\": []}");
/// ```
pub fn extract_json(response: &str) -> Result<&str> {
    let body = strip_code_fence(response);

    let mut openers: Vec<(usize, char)> = [('{', '}'), ('[', ']')]
        .iter()
        .filter_map(|&(open, close)| body.find(open).map(|start| (start, close)))
        .collect();
    if openers.is_empty() {
        return Err(Error::Parse("JSONが見つかりません".into()));
    }
    openers.sort_by_key(|&(start, _)| start);

    let candidates: Vec<&str> = openers
        .into_iter()
        .filter_map(|(start, close)| match body.rfind(close) {
            Some(end) if end > start => Some(&body[start..=end]),
            _ => None,
        })
        .collect();

    // 前置きの文章に括弧が含まれる場合があるので、読める方を優先
    candidates
        .iter()
        .find(|c| serde_json::from_str::<Value>(c).is_ok())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| Error::Parse("JSONが閉じていません".into()))
}

fn strip_code_fence(response: &str) -> &str {
    let Some(fence) = response.find("```") else {
        return response.trim();
    };
    let mut start = fence + 3;
    if response[start..].to_lowercase().starts_with("json") {
        start += 4;
    }
    match response[start..].find("```") {
        Some(offset) => response[start..start + offset].trim(),
        None => response[start..].trim(),
    }
}

/// 分類器の応答をパース
///
/// `{"items": [...]}` と素の配列 `[...]` の両方を受け付ける。
/// 空の応答は「検出なし」として空リストを返す。
pub fn parse_classifier_response(response: &str) -> Result<Vec<DetectedItem>> {
    if response.trim().is_empty() {
        return Ok(Vec::new());
    }

    let json_str = extract_json(response)?;
    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| Error::Parse(format!("分類結果 JSONパースエラー: {}", e)))?;

    let raw_items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(Error::Parse(format!("items が配列ではありません: {}", other)));
            }
        },
        other => return Err(Error::Parse(format!("予期しないJSON: {}", other))),
    };

    Ok(raw_items.iter().filter_map(item_from_value).collect())
}

/// 1件分のJSONを検証して DetectedItem へ変換（オブジェクト以外は捨てる）
pub fn item_from_value(value: &Value) -> Option<DetectedItem> {
    let obj = value.as_object()?;
    let field = |key: &str| obj.get(key).unwrap_or(&Value::Null);

    let confidence = number_from(field("confidence")).unwrap_or(0.0).clamp(0.0, 1.0);
    let low = number_from(field("low")).unwrap_or(0.0).max(0.0);
    let high = number_from(field("high")).unwrap_or(0.0).max(0.0);

    let mut item = DetectedItem::new(
        &text_from(field("name")),
        &text_from(field("brand")),
        confidence,
        low,
        high,
    );
    item.bbox = box_from(field("box"));
    Some(item)
}

fn text_from(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// 数値または数値文字列を f64 へ
pub fn number_from(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = s.replace(',', "");
            cleaned
                .trim()
                .parse::<f64>()
                .ok()
                .or_else(|| NUMBER_RE.find(&cleaned).and_then(|m| m.as_str().parse().ok()))
        }
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn box_from(value: &Value) -> Option<BoundingBox> {
    let obj = value.as_object()?;
    let coord = |key: &str| obj.get(key).and_then(number_from);
    Some(BoundingBox {
        x: coord("x")?,
        y: coord("y")?,
        w: coord("w")?,
        h: coord("h")?,
    })
}
