//! 検出枠描画モジュール
//!
//! 元画像に検出物品の枠と名前ラベルを描き、PNGとして再エンコードする。
//! 失敗はすべて `None` で表し、呼び出し側へエラーを返さない。

use ab_glyph::FontVec;
use auction_vision_common::{BoundingBox, DetectedItem};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

/// 物品ごとに循環させる5色パレット
const PALETTE: [Rgb<u8>; 5] = [
    Rgb([239, 68, 68]),
    Rgb([34, 197, 94]),
    Rgb([59, 130, 246]),
    Rgb([234, 179, 8]),
    Rgb([168, 85, 247]),
];

const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const FALLBACK_LABEL: &str = "Object";

const SYSTEM_FONTS: [&str; 5] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// 枠描画器
///
/// フォントがない場合もラベル背景と枠は描く（文字だけ省略）。
#[derive(Default)]
pub struct ImageAnnotator {
    font: Option<FontVec>,
}

impl ImageAnnotator {
    /// 文字なしで描画する
    pub fn without_font() -> Self {
        Self::default()
    }

    /// 指定フォント、なければシステムフォントを探す
    pub fn with_font(font_path: Option<&Path>) -> Self {
        if let Some(path) = font_path {
            match load_font(path) {
                Some(font) => return Self { font: Some(font) },
                None => warn!(path = %path.display(), "failed to load label font, probing system fonts"),
            }
        }
        Self::with_system_font()
    }

    pub fn with_system_font() -> Self {
        for path in SYSTEM_FONTS {
            if let Some(font) = load_font(Path::new(path)) {
                info!(path, "loaded label font");
                return Self { font: Some(font) };
            }
        }
        warn!("no label font found, label tags will be drawn without item names; set font_path in config");
        Self::default()
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 枠とラベルを描いたPNGを返す。デコード/エンコード失敗は `None`
    pub fn annotate(&self, image_bytes: &[u8], items: &[DetectedItem]) -> Option<Vec<u8>> {
        let mut img = match image::load_from_memory(image_bytes) {
            Ok(decoded) => decoded.to_rgb8(),
            Err(e) => {
                debug!(error = %e, "annotation skipped: image did not decode");
                return None;
            }
        };

        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let thickness = (width / 200).max(2);
        let label_scale = (width as f32 / 40.0).max(14.0);

        for (idx, item) in items.iter().enumerate() {
            let Some(bbox) = item.bbox else { continue };
            let Some(rect) = pixel_rect(&bbox, width, height) else {
                continue;
            };
            let color = PALETTE[idx % PALETTE.len()];

            draw_outline(&mut img, rect, thickness, color);
            self.draw_label(&mut img, rect, &label_text(item), label_scale, color);
        }

        let mut buf = Vec::new();
        match img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png) {
            Ok(()) => Some(buf),
            Err(e) => {
                warn!(error = %e, "annotation skipped: PNG encode failed");
                None
            }
        }
    }

    fn draw_label(&self, img: &mut RgbImage, rect: Rect, text: &str, scale: f32, color: Rgb<u8>) {
        let pad = (scale / 4.0).round() as i32;
        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, text),
            None => ((scale * 0.6 * text.chars().count() as f32) as u32, scale as u32),
        };
        let tag_w = text_w + 2 * pad as u32;
        let tag_h = text_h + 2 * pad as u32;

        // 枠の上に置き、画像上端を超えるなら y=0 に寄せる
        let tag_x = rect.left();
        let tag_y = (rect.top() - tag_h as i32).max(0);

        draw_filled_rect_mut(img, Rect::at(tag_x, tag_y).of_size(tag_w, tag_h), color);

        if let Some(font) = &self.font {
            draw_text_mut(img, LABEL_TEXT_COLOR, tag_x + pad, tag_y + pad, scale, font, text);
        }
    }
}

fn load_font(path: &Path) -> Option<FontVec> {
    let data = std::fs::read(path).ok()?;
    FontVec::try_from_vec(data).ok()
}

fn label_text(item: &DetectedItem) -> String {
    let name = item.name.trim();
    if name.is_empty() {
        FALLBACK_LABEL.to_string()
    } else {
        name.to_string()
    }
}

fn draw_outline(img: &mut RgbImage, rect: Rect, thickness: u32, color: Rgb<u8>) {
    let (width, height) = img.dimensions();
    for t in 0..thickness {
        let t = t as i32;
        let w = rect.width() as i32 - 2 * t;
        let h = rect.height() as i32 - 2 * t;
        if w <= 0 || h <= 0 || rect.left() + t >= width as i32 || rect.top() + t >= height as i32 {
            break;
        }
        let inner = Rect::at(rect.left() + t, rect.top() + t).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(img, inner, color);
    }
}

/// 正規化座標（または絶対ピクセル）の枠をピクセル矩形にする
///
/// いずれかの値が 1 を超える場合は枠全体を絶対ピクセルとみなして正規化する。
/// 幅・高さが 0 以下になる枠は `None`。
pub fn pixel_rect(bbox: &BoundingBox, width: u32, height: u32) -> Option<Rect> {
    let values = [bbox.x, bbox.y, bbox.w, bbox.h];
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let (w_f, h_f) = (width as f64, height as f64);
    let (mut x, mut y, mut w, mut h) = (bbox.x, bbox.y, bbox.w, bbox.h);
    if values.iter().any(|v| *v > 1.0) {
        x /= w_f;
        w /= w_f;
        y /= h_f;
        h /= h_f;
    }

    let x = x.clamp(0.0, 1.0);
    let y = y.clamp(0.0, 1.0);
    let w = w.clamp(0.0, 1.0);
    let h = h.clamp(0.0, 1.0);

    let x1 = (x * w_f).round() as i64;
    let y1 = (y * h_f).round() as i64;
    let x2 = (((x + w) * w_f).round() as i64).min(width as i64);
    let y2 = (((y + h) * h_f).round() as i64).min(height as i64);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(Rect::at(x1 as i32, y1 as i32).of_size((x2 - x1) as u32, (y2 - y1) as u32))
}
