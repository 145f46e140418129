//! 解析実行モジュール
//!
//! 1オークション分の画像URLを順番に処理し、画像ごとに進捗イベントを送る。
//!
//! 1枚の処理順序:
//! 1. キャンセル確認
//! 2. 画像取得（タイムアウト付き）
//! 3. 既出物品名を添えて分類（タイムアウト付き）
//! 4. 集計へ取り込み（重複排除・信頼度加重）
//! 5. 枠描画（失敗は `None`）
//! 6. `Progress` 送信
//! 7. キャンセル確認
//!
//! 1枚単位の失敗は `ImageFailed` として送り、実行は止めない。
//! 最後のイベントは必ず `Completed` か `Cancelled` のどちらか1つ。

use crate::annotator::ImageAnnotator;
use crate::classifier::VisionClassifier;
use crate::error::{AuctionVisionError, Result};
use crate::fetcher::ImageFetcher;
use auction_vision_common::{AnalysisResult, DetectedItem, ImageSummary, ItemAggregator, Totals};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(60);

/// 失敗した処理段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Fetch,
    Classify,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Fetch => write!(f, "fetch"),
            FailureStage::Classify => write!(f, "classify"),
        }
    }
}

/// ワーカーから呼び出し側へ送られるイベント
#[derive(Debug, Clone)]
pub enum RunEvent {
    Progress {
        auction_id: String,
        current: usize,
        total: usize,
        /// ここまでの集計済み物品（コピー）
        items: Vec<DetectedItem>,
        /// 切り捨て前の累積合計
        running_totals: Totals,
        summary: ImageSummary,
    },
    ImageFailed {
        auction_id: String,
        index: usize,
        total: usize,
        url: String,
        stage: FailureStage,
        reason: String,
    },
    Cancelled {
        auction_id: String,
    },
    Completed {
        auction_id: String,
        result: AnalysisResult,
    },
}

impl RunEvent {
    pub fn auction_id(&self) -> &str {
        match self {
            RunEvent::Progress { auction_id, .. }
            | RunEvent::ImageFailed { auction_id, .. }
            | RunEvent::Cancelled { auction_id }
            | RunEvent::Completed { auction_id, .. } => auction_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Cancelled { .. } | RunEvent::Completed { .. })
    }
}

/// キャンセル要求（何度呼んでも同じ）
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// `start` で起動した実行への窓口
pub struct RunHandle {
    events: UnboundedReceiver<RunEvent>,
    cancel: CancelHandle,
    join: JoinHandle<()>,
}

impl RunHandle {
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn request_cancel(&self) {
        self.cancel.request_cancel();
    }

    /// 次のイベント。実行が終わり全イベントを受け取ると `None`
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// ワーカータスクの終了を待つ
    pub async fn join(self) -> Result<()> {
        self.join
            .await
            .map_err(|e| AuctionVisionError::Worker(format!("解析タスク異常終了: {}", e)))
    }
}

/// 1オークション分の解析実行
pub struct AnalysisRun {
    auction_id: String,
    urls: Vec<String>,
    fetcher: Arc<dyn ImageFetcher>,
    classifier: Arc<dyn VisionClassifier>,
    annotator: Option<Arc<ImageAnnotator>>,
    fetch_timeout: Duration,
    classify_timeout: Duration,
    cancel: CancelHandle,
}

impl AnalysisRun {
    /// 空白URLを除いて1件も残らなければ `NoImages`
    pub fn new(
        auction_id: &str,
        urls: &[String],
        fetcher: Arc<dyn ImageFetcher>,
        classifier: Arc<dyn VisionClassifier>,
    ) -> Result<Self> {
        let urls: Vec<String> = urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(String::from)
            .collect();

        if urls.is_empty() {
            return Err(AuctionVisionError::NoImages(auction_id.to_string()));
        }

        Ok(Self {
            auction_id: auction_id.to_string(),
            urls,
            fetcher,
            classifier,
            annotator: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            classify_timeout: DEFAULT_CLASSIFY_TIMEOUT,
            cancel: CancelHandle::new(),
        })
    }

    pub fn with_annotator(mut self, annotator: Arc<ImageAnnotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn with_timeouts(mut self, fetch: Duration, classify: Duration) -> Self {
        self.fetch_timeout = fetch;
        self.classify_timeout = classify;
        self
    }

    pub fn auction_id(&self) -> &str {
        &self.auction_id
    }

    pub fn image_count(&self) -> usize {
        self.urls.len()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// tokio タスクとして起動
    pub fn start(self) -> RunHandle {
        let (tx, events) = mpsc::unbounded_channel();
        let cancel = self.cancel.clone();
        let join = tokio::spawn(self.run(tx));
        RunHandle { events, cancel, join }
    }

    /// 実行ループ本体。イベントは `tx` へ送る
    ///
    /// 受信側が閉じていても最後まで（またはキャンセルまで）処理する。
    pub async fn run(self, tx: UnboundedSender<RunEvent>) {
        let total = self.urls.len();
        let mut aggregator = ItemAggregator::new();
        let mut failures = 0usize;

        info!(auction_id = %self.auction_id, images = total, "analysis started");

        for (i, url) in self.urls.iter().enumerate() {
            let index = i + 1;

            if self.cancel.is_cancelled() {
                self.emit_cancelled(&tx, index - 1);
                return;
            }

            let mut found = Vec::new();
            let mut annotated = None;

            match self.fetch(url).await {
                Ok(bytes) => {
                    let classified = self.classify(&bytes, aggregator.seen_names()).await;
                    match classified {
                        Ok(items) => {
                            let added = aggregator.merge(&items);
                            debug!(
                                auction_id = %self.auction_id,
                                index,
                                detected = items.len(),
                                added,
                                "image classified"
                            );
                            annotated = self.annotate(bytes, &items).await;
                            found = items;
                        }
                        Err(e) => {
                            failures += 1;
                            self.emit_failure(&tx, index, url, FailureStage::Classify, &e);
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    self.emit_failure(&tx, index, url, FailureStage::Fetch, &e);
                }
            }

            let _ = tx.send(RunEvent::Progress {
                auction_id: self.auction_id.clone(),
                current: index,
                total,
                items: aggregator.items().to_vec(),
                running_totals: aggregator.running_totals(),
                summary: ImageSummary {
                    url: url.clone(),
                    index,
                    items: found,
                    annotated,
                },
            });

            if self.cancel.is_cancelled() {
                self.emit_cancelled(&tx, index);
                return;
            }
        }

        let result = aggregator.finish();
        info!(
            auction_id = %self.auction_id,
            items = result.items.len(),
            total_low = result.total_low,
            total_high = result.total_high,
            failures,
            "analysis completed"
        );
        let _ = tx.send(RunEvent::Completed {
            auction_id: self.auction_id.clone(),
            result,
        });
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(AuctionVisionError::Timeout(format!(
                "画像取得が{:?}を超えました",
                self.fetch_timeout
            ))),
        }
    }

    async fn classify(&self, bytes: &[u8], seen: &[String]) -> Result<Vec<DetectedItem>> {
        match tokio::time::timeout(self.classify_timeout, self.classifier.classify(bytes, seen)).await {
            Ok(result) => result,
            Err(_) => Err(AuctionVisionError::Timeout(format!(
                "画像分類が{:?}を超えました",
                self.classify_timeout
            ))),
        }
    }

    /// 画像ごとの検出結果だけを描く。描画はブロッキングスレッドで行う
    async fn annotate(&self, bytes: Vec<u8>, items: &[DetectedItem]) -> Option<Vec<u8>> {
        let annotator = self.annotator.clone()?;
        let items = items.to_vec();

        match tokio::task::spawn_blocking(move || annotator.annotate(&bytes, &items)).await {
            Ok(annotated) => {
                if annotated.is_none() {
                    debug!(auction_id = %self.auction_id, "annotation unavailable");
                }
                annotated
            }
            Err(e) => {
                warn!(auction_id = %self.auction_id, error = %e, "annotation task failed");
                None
            }
        }
    }

    fn emit_failure(
        &self,
        tx: &UnboundedSender<RunEvent>,
        index: usize,
        url: &str,
        stage: FailureStage,
        error: &AuctionVisionError,
    ) {
        warn!(
            auction_id = %self.auction_id,
            index,
            total = self.urls.len(),
            %stage,
            error = %error,
            "image failed"
        );
        let _ = tx.send(RunEvent::ImageFailed {
            auction_id: self.auction_id.clone(),
            index,
            total: self.urls.len(),
            url: url.to_string(),
            stage,
            reason: error.to_string(),
        });
    }

    fn emit_cancelled(&self, tx: &UnboundedSender<RunEvent>, processed: usize) {
        info!(auction_id = %self.auction_id, processed, "analysis cancelled");
        let _ = tx.send(RunEvent::Cancelled {
            auction_id: self.auction_id.clone(),
        });
    }
}
