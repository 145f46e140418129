//! 分類結果キャッシュモジュール
//!
//! 画像バイト列のSHA-256をキーにして分類結果をキャッシュし、
//! 同じ画像の再分類をスキップする。

use super::VisionClassifier;
use crate::error::Result;
use async_trait::async_trait;
use auction_vision_common::DetectedItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

const CACHE_FILE_NAME: &str = "vision-cache.json";

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    /// バージョン（互換性チェック用）
    version: u32,
    /// 画像ハッシュ → 分類結果のマップ
    entries: HashMap<String, CacheEntry>,
}

/// キャッシュエントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 画像サイズ（バイト）
    pub byte_len: u64,
    pub cached_at: DateTime<Utc>,
    pub items: Vec<DetectedItem>,
}

impl CacheFile {
    const CURRENT_VERSION: u32 = 1;

    pub fn cache_path(dir: &Path) -> PathBuf {
        dir.join(CACHE_FILE_NAME)
    }

    /// キャッシュファイルを読み込み（存在しない・壊れている場合は空）
    pub fn load(dir: &Path) -> Self {
        let cache_path = Self::cache_path(dir);
        if !cache_path.exists() {
            return Self::default();
        }

        let file = match File::open(&cache_path) {
            Ok(f) => f,
            Err(_) => return Self::default(),
        };

        let reader = BufReader::new(file);
        match serde_json::from_reader::<_, CacheFile>(reader) {
            Ok(cache) => {
                // バージョンチェック
                if cache.version != Self::CURRENT_VERSION {
                    warn!(found = cache.version, "vision cache version mismatch, starting empty");
                    return Self::default();
                }
                cache
            }
            Err(_) => Self::default(),
        }
    }

    /// キャッシュファイルを保存
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let file = File::create(Self::cache_path(dir))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// キャッシュファイルを削除（存在した場合 true）
    pub fn clear(dir: &Path) -> Result<bool> {
        let cache_path = Self::cache_path(dir);
        if !cache_path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(cache_path)?;
        Ok(true)
    }

    pub fn get(&self, hash: &str) -> Option<&[DetectedItem]> {
        self.entries.get(hash).map(|e| e.items.as_slice())
    }

    pub fn insert(&mut self, hash: String, byte_len: u64, items: Vec<DetectedItem>) {
        self.entries.insert(hash, CacheEntry {
            byte_len,
            cached_at: Utc::now(),
            items,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// 画像バイト列のハッシュ（SHA-256 hex）
pub fn image_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// キャッシュ付き分類器
///
/// 既出物品名はキーに含めない。重複排除は解析側で必ず行われる。
pub struct CachedClassifier<C> {
    inner: C,
    dir: PathBuf,
    cache: Mutex<CacheFile>,
}

impl<C: VisionClassifier> CachedClassifier<C> {
    pub fn new(inner: C, dir: &Path) -> Self {
        Self {
            inner,
            dir: dir.to_path_buf(),
            cache: Mutex::new(CacheFile::load(dir)),
        }
    }
}

#[async_trait]
impl<C: VisionClassifier> VisionClassifier for CachedClassifier<C> {
    async fn classify(&self, image: &[u8], seen_item_names: &[String]) -> Result<Vec<DetectedItem>> {
        let hash = image_hash(image);

        let hit = match self.cache.lock() {
            Ok(cache) => cache.get(&hash).map(|items| items.to_vec()),
            Err(_) => None,
        };
        if let Some(items) = hit {
            debug!(hash = %hash, items = items.len(), "vision cache hit");
            return Ok(items);
        }

        let items = self.inner.classify(image, seen_item_names).await?;

        let snapshot = match self.cache.lock() {
            Ok(mut cache) => {
                cache.insert(hash, image.len() as u64, items.clone());
                Some(cache.clone())
            }
            Err(_) => None,
        };

        // ファイル書き込みはランタイムのワーカーを塞がないよう別スレッドで
        if let Some(snapshot) = snapshot {
            let dir = self.dir.clone();
            match tokio::task::spawn_blocking(move || snapshot.save(&dir)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "failed to save vision cache"),
                Err(e) => warn!(error = %e, "vision cache save task failed"),
            }
        }

        Ok(items)
    }
}
