use crate::error::{AuctionVisionError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub temperature: f32,
    pub fetch_timeout_seconds: u64,
    pub classify_timeout_seconds: u64,
    /// 見積もり保存先（未指定ならデータディレクトリ）
    pub store_path: Option<PathBuf>,
    /// 分類結果キャッシュの置き場所
    pub cache_dir: Option<PathBuf>,
    /// ラベル描画用フォント
    pub font_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".into(),
            api_url: DEFAULT_API_URL.into(),
            temperature: 0.2,
            fetch_timeout_seconds: 10,
            classify_timeout_seconds: 60,
            store_path: None,
            cache_dir: None,
            font_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AuctionVisionError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("auction-vision").join("config.json"))
    }

    pub fn get_api_key(&self) -> Result<String> {
        // 環境変数を優先
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }

        self.api_key.clone().ok_or(AuctionVisionError::MissingApiKey)
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds.max(1))
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_seconds.max(1))
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        let data = dirs::data_dir()
            .ok_or_else(|| AuctionVisionError::Config("データディレクトリが見つかりません".into()))?;
        Ok(data.join("auction-vision").join("estimates.json"))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let cache = dirs::cache_dir()
            .ok_or_else(|| AuctionVisionError::Config("キャッシュディレクトリが見つかりません".into()))?;
        Ok(cache.join("auction-vision"))
    }
}
