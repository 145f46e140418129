//! 結合テスト用のモック
//!
//! 取得側は URL をそのままバイト列として返し、分類側はそのバイト列(URL)で
//! 応答を引く。失敗させたいURLは個別に登録する。

#![allow(dead_code)]

use async_trait::async_trait;
use auction_vision::error::{AuctionVisionError, Result};
use auction_vision::fetcher::ImageFetcher;
use auction_vision::classifier::VisionClassifier;
use auction_vision::pipeline::{AnalysisRun, RunEvent};
use auction_vision::CancelHandle;
use auction_vision_common::{BoundingBox, DetectedItem};
use image::{ImageFormat, Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn url(n: usize) -> String {
    format!("https://img.example/{}.jpg", n)
}

pub fn item(name: &str, brand: &str, confidence: f64, low: f64, high: f64) -> DetectedItem {
    DetectedItem::new(name, brand, confidence, low, high)
}

pub fn boxed(name: &str, x: f64, y: f64, w: f64, h: f64) -> DetectedItem {
    DetectedItem::new(name, "", 0.9, 10.0, 20.0).with_box(BoundingBox { x, y, w, h })
}

/// 単色のPNG
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([128, 128, 128]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("PNG生成失敗");
    buf
}

/// URLのバイト列を返す取得モック
#[derive(Default)]
pub struct UrlFetcher {
    failing: HashSet<String>,
    delay: Option<Duration>,
    png: Option<Vec<u8>>,
}

impl UrlFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// どのURLにも同じPNGを返す
    pub fn serving_png(mut self, png: Vec<u8>) -> Self {
        self.png = Some(png);
        self
    }
}

#[async_trait]
impl ImageFetcher for UrlFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(url) {
            return Err(AuctionVisionError::ImageFetch(format!("404 Not Found: {}", url)));
        }
        Ok(self.png.clone().unwrap_or_else(|| url.as_bytes().to_vec()))
    }
}

/// バイト列(URL)ごとに応答を決める分類モック
#[derive(Default)]
pub struct MapClassifier {
    by_url: HashMap<String, Vec<DetectedItem>>,
    fallback: Vec<DetectedItem>,
    failing: HashSet<String>,
    calls: Mutex<Vec<Vec<String>>>,
    cancel_on: Mutex<Option<(String, CancelHandle)>>,
}

impl MapClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, items: Vec<DetectedItem>) -> Self {
        self.by_url.insert(url.to_string(), items);
        self
    }

    /// 未登録のバイト列に対する応答
    pub fn fallback(mut self, items: Vec<DetectedItem>) -> Self {
        self.fallback = items;
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// 指定URLの分類中にキャンセルを要求する
    pub fn cancel_while_classifying(&self, url: &str, handle: CancelHandle) {
        *self.cancel_on.lock().unwrap() = Some((url.to_string(), handle));
    }

    /// 呼び出しごとに渡された既出物品名
    pub fn seen_per_call(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionClassifier for MapClassifier {
    async fn classify(&self, image: &[u8], seen_item_names: &[String]) -> Result<Vec<DetectedItem>> {
        self.calls.lock().unwrap().push(seen_item_names.to_vec());
        let key = String::from_utf8_lossy(image).to_string();

        if let Some((target, handle)) = self.cancel_on.lock().unwrap().as_ref() {
            if *target == key {
                handle.request_cancel();
            }
        }

        if self.failing.contains(&key) {
            return Err(AuctionVisionError::Classification("malformed provider response".into()));
        }
        Ok(self.by_url.get(&key).cloned().unwrap_or_else(|| self.fallback.clone()))
    }
}

/// 実行をその場で最後まで回し、送られたイベントを順に返す
pub async fn run_to_end(run: AnalysisRun) -> Vec<RunEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    run.run(tx).await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn progress_count(events: &[RunEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, RunEvent::Progress { .. }))
        .count()
}

pub fn build_run(urls: &[String], fetcher: UrlFetcher, classifier: Arc<MapClassifier>) -> AnalysisRun {
    AnalysisRun::new("A1", urls, Arc::new(fetcher), classifier).expect("解析実行の生成失敗")
}
