//! 画像分類モジュール
//!
//! 画像1枚と既出物品名を受け取り、新規に見つかった物品を返す。
//! - openai: OpenAI chat-completions のビジョン呼び出し
//! - cache: 画像ハッシュをキーにした分類結果キャッシュ

pub mod cache;
pub mod openai;

pub use cache::{image_hash, CacheFile, CachedClassifier};
pub use openai::OpenAiClassifier;

use crate::error::Result;
use async_trait::async_trait;
use auction_vision_common::DetectedItem;

#[async_trait]
pub trait VisionClassifier: Send + Sync {
    /// 失敗は `Classification` エラーとして返し、空リストと区別する
    async fn classify(&self, image: &[u8], seen_item_names: &[String]) -> Result<Vec<DetectedItem>>;
}
