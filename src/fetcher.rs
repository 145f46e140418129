//! 画像取得モジュール
//!
//! URLから画像バイト列を取得する。失敗は1枚単位で扱われ、解析全体は止めない。

use crate::error::{AuctionVisionError, Result};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest による取得
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuctionVisionError::Config(format!("HTTPクライアント生成エラー: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuctionVisionError::ImageFetch(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuctionVisionError::ImageFetch(e.to_string()))?;

        if bytes.is_empty() {
            return Err(AuctionVisionError::ImageFetch(format!("空のレスポンス: {}", url)));
        }

        Ok(bytes.to_vec())
    }
}
