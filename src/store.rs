//! 見積もり保存モジュール
//!
//! オークションIDをキーにAI解析結果と手動上書きを保存する。

use crate::error::{AuctionVisionError, Result};
use auction_vision_common::{resolve, AnalysisResult, ManualOverride, StoredEstimate};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 最近の見積もり一覧の1行
#[derive(Debug, Clone, PartialEq)]
pub struct RecentEstimate {
    pub auction_id: String,
    pub facility_name: String,
    pub updated_at: DateTime<Utc>,
    /// 手動上書きがあればそちらの合計
    pub effective_low: f64,
    pub effective_high: f64,
    pub is_manual: bool,
}

/// オークションID単位のキーバリュー保存
pub trait ResultStore {
    /// AI結果を保存。空の施設名で既存の施設名を上書きしない
    fn save_analysis(&mut self, auction_id: &str, result: &AnalysisResult, facility_name: &str) -> Result<()>;

    /// 新しいAI結果を保存し、手動上書きを破棄する。1回の書き込みで行う
    fn replace_analysis(&mut self, auction_id: &str, result: &AnalysisResult, facility_name: &str) -> Result<()>;

    fn load(&self, auction_id: &str) -> Result<Option<StoredEstimate>>;

    /// 手動上書きだけを保存
    fn save_manual(&mut self, auction_id: &str, manual: &ManualOverride) -> Result<()>;

    /// 手動上書きを消す。AI結果はそのまま
    fn clear_manual(&mut self, auction_id: &str) -> Result<()>;

    /// 更新日時の新しい順
    fn list_recent(&self, limit: usize) -> Result<Vec<RecentEstimate>>;
}

/// 保存ファイルの構造
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    estimates: BTreeMap<String, StoredEstimate>,
}

impl StoreFile {
    const CURRENT_VERSION: u32 = 1;
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            estimates: BTreeMap::new(),
        }
    }
}

/// JSONファイルによる保存
///
/// 変更のたびにファイル全体を書き直す。
pub struct JsonResultStore {
    path: PathBuf,
    file: StoreFile,
}

impl JsonResultStore {
    /// ファイルがなければ空で開く。壊れたファイルはエラー
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                file: StoreFile::default(),
            });
        }

        let reader = BufReader::new(File::open(path)?);
        let file: StoreFile = serde_json::from_reader(reader).map_err(|e| {
            AuctionVisionError::Store(format!("{} を読み込めません: {}", path.display(), e))
        })?;

        if file.version != StoreFile::CURRENT_VERSION {
            return Err(AuctionVisionError::Store(format!(
                "未対応のバージョン {} ({})",
                file.version,
                path.display()
            )));
        }

        debug!(path = %path.display(), records = file.estimates.len(), "estimate store opened");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.file.estimates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.estimates.is_empty()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(writer, &self.file)?;
        Ok(())
    }

    /// AI結果をメモリ上のレコードへ反映（書き込みは呼び出し側）
    fn upsert_analysis(&mut self, auction_id: &str, result: &AnalysisResult, facility_name: &str) -> &mut StoredEstimate {
        let stamp = self.next_stamp();
        let facility_name = facility_name.trim();

        let record = self
            .file
            .estimates
            .entry(auction_id.to_string())
            .or_insert_with(|| StoredEstimate::from_analysis(auction_id, facility_name, result));

        record.items = result.items.clone();
        record.total_low = result.total_low as f64;
        record.total_high = result.total_high as f64;
        if !facility_name.is_empty() {
            record.facility_name = facility_name.to_string();
        }
        record.updated_at = stamp;
        record
    }

    /// 既存の最新時刻より必ず後になる更新時刻
    fn next_stamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.file.estimates.values().map(|e| e.updated_at).max() {
            Some(latest) if latest >= now => latest + Duration::microseconds(1),
            _ => now,
        }
    }
}

impl ResultStore for JsonResultStore {
    fn save_analysis(&mut self, auction_id: &str, result: &AnalysisResult, facility_name: &str) -> Result<()> {
        self.upsert_analysis(auction_id, result, facility_name);
        self.persist()
    }

    fn replace_analysis(&mut self, auction_id: &str, result: &AnalysisResult, facility_name: &str) -> Result<()> {
        let record = self.upsert_analysis(auction_id, result, facility_name);
        record.manual_items = None;
        record.manual_total_low = None;
        record.manual_total_high = None;
        self.persist()
    }

    fn load(&self, auction_id: &str) -> Result<Option<StoredEstimate>> {
        Ok(self.file.estimates.get(auction_id).cloned())
    }

    fn save_manual(&mut self, auction_id: &str, manual: &ManualOverride) -> Result<()> {
        let stamp = self.next_stamp();
        let record = self
            .file
            .estimates
            .entry(auction_id.to_string())
            .or_insert_with(|| StoredEstimate::from_analysis(auction_id, "", &AnalysisResult::default()));

        record.manual_items = Some(manual.items.clone());
        record.manual_total_low = Some(manual.totals.low);
        record.manual_total_high = Some(manual.totals.high);
        record.updated_at = stamp;

        self.persist()
    }

    fn clear_manual(&mut self, auction_id: &str) -> Result<()> {
        let stamp = self.next_stamp();
        let Some(record) = self.file.estimates.get_mut(auction_id) else {
            return Ok(());
        };

        if record.manual_items.is_none()
            && record.manual_total_low.is_none()
            && record.manual_total_high.is_none()
        {
            return Ok(());
        }

        record.manual_items = None;
        record.manual_total_low = None;
        record.manual_total_high = None;
        record.updated_at = stamp;

        self.persist()
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<RecentEstimate>> {
        let mut records: Vec<&StoredEstimate> = self.file.estimates.values().collect();
        records.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.auction_id.cmp(&b.auction_id))
        });

        Ok(records
            .into_iter()
            .take(limit)
            .map(|record| {
                let active = resolve(record);
                RecentEstimate {
                    auction_id: record.auction_id.clone(),
                    facility_name: record.facility_name.clone(),
                    updated_at: record.updated_at,
                    effective_low: active.totals.low,
                    effective_high: active.totals.high,
                    is_manual: active.is_manual,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = JsonResultStore::open(&dir.path().join("estimates.json")).unwrap();
        assert!(store.is_empty());
        assert!(store.load("A1").unwrap().is_none());
    }

    #[test]
    fn test_corrupted_file_is_error() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("estimates.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonResultStore::open(&path),
            Err(AuctionVisionError::Store(_))
        ));
    }

    #[test]
    fn test_version_mismatch_is_error() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("estimates.json");
        std::fs::write(&path, r#"{"version": 99, "estimates": {}}"#).unwrap();
        assert!(JsonResultStore::open(&path).is_err());
    }

    #[test]
    fn test_stamps_strictly_increase() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut store = JsonResultStore::open(&dir.path().join("estimates.json")).unwrap();
        let result = AnalysisResult::default();

        store.save_analysis("A1", &result, "").unwrap();
        let first = store.load("A1").unwrap().unwrap().updated_at;
        store.save_analysis("A2", &result, "").unwrap();
        let second = store.load("A2").unwrap().unwrap().updated_at;
        assert!(second > first);
    }

    #[test]
    fn test_replace_analysis_drops_manual_in_one_write() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("estimates.json");
        let mut store = JsonResultStore::open(&path).unwrap();
        store.save_analysis("A1", &AnalysisResult::default(), "Main St").unwrap();
        store
            .save_manual("A1", &ManualOverride {
                items: Vec::new(),
                totals: Default::default(),
            })
            .unwrap();

        let result = AnalysisResult {
            total_low: 5,
            total_high: 9,
            ..AnalysisResult::default()
        };
        store.replace_analysis("A1", &result, "").unwrap();

        let reopened = JsonResultStore::open(&path).unwrap();
        let stored = reopened.load("A1").unwrap().unwrap();
        assert!(stored.manual_items.is_none());
        assert!(stored.manual_total_low.is_none());
        assert_eq!(stored.total_low, 5.0);
        assert_eq!(stored.facility_name, "Main St");
    }
}
