//! エラーケーステスト
//!
//! エラー型の表示・変換と、入力不備時のエラーを検証

use auction_vision::config::Config;
use auction_vision::error::AuctionVisionError;
use auction_vision::{JsonResultStore, ResultStore};
use auction_vision_common::parse_classifier_response;
use tempfile::tempdir;

/// AuctionVisionErrorのDisplay実装確認
#[test]
fn test_error_display() {
    let errors = vec![
        AuctionVisionError::Config("テスト設定エラー".to_string()),
        AuctionVisionError::NoImages("A1".to_string()),
        AuctionVisionError::ImageFetch("404".to_string()),
        AuctionVisionError::Classification("bad json".to_string()),
        AuctionVisionError::Timeout("10s".to_string()),
        AuctionVisionError::Store("壊れたファイル".to_string()),
        AuctionVisionError::NotFound("A1".to_string()),
        AuctionVisionError::Worker("panic".to_string()),
        AuctionVisionError::RunInProgress("A1".to_string()),
        AuctionVisionError::Prompt("not a terminal".to_string()),
        AuctionVisionError::Common(auction_vision_common::Error::Export("Excel生成エラー".to_string())),
    ];

    for err in errors {
        let display = format!("{}", err);
        assert!(!display.is_empty(), "エラーメッセージが空: {:?}", err);
    }
}

/// MissingApiKeyエラーのメッセージ確認
#[test]
fn test_missing_api_key_message() {
    let display = format!("{}", AuctionVisionError::MissingApiKey);

    assert!(display.contains("APIキー"));
    assert!(display.contains("auction-vision config"));
    assert!(display.contains("OPENAI_API_KEY"));
}

/// エラーのDebug実装確認
#[test]
fn test_error_debug() {
    let err = AuctionVisionError::NoImages("A7".to_string());
    let debug = format!("{:?}", err);

    assert!(debug.contains("NoImages"));
    assert!(debug.contains("A7"));
}

/// IOエラーからの変換
#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: AuctionVisionError = io_err.into();

    assert!(matches!(err, AuctionVisionError::Io(_)));
    assert!(format!("{}", err).contains("IO"));
}

/// JSONエラーからの変換
#[test]
fn test_json_error_conversion() {
    let json_err = serde_json::from_str::<serde_json::Value>("{ invalid }").unwrap_err();
    let err: AuctionVisionError = json_err.into();

    assert!(matches!(err, AuctionVisionError::JsonParse(_)));
}

/// common::Errorからの変換（透過的エラー）
#[test]
fn test_common_error_conversion() {
    let common_err = auction_vision_common::Error::Parse("パースエラー".to_string());
    let err: AuctionVisionError = common_err.into();

    assert!(matches!(err, AuctionVisionError::Common(_)));
    assert!(format!("{}", err).contains("パースエラー"));
}

/// 出力エラーは共通エラー経由で `?` 伝播する
#[test]
fn test_export_error_propagates_through_common() {
    fn render() -> auction_vision::Result<Vec<u8>> {
        let buffer: auction_vision_common::Result<Vec<u8>> =
            Err(auction_vision_common::Error::Export("シート名設定エラー".to_string()));
        let bytes = buffer?;
        Ok(bytes)
    }

    let err = render().unwrap_err();
    assert!(matches!(err, AuctionVisionError::Common(auction_vision_common::Error::Export(_))));
    assert!(format!("{}", err).contains("シート名設定エラー"));
}

/// 壊れた分類応答はパースエラー（空リストにはしない）
#[test]
fn test_malformed_classifier_response() {
    let result = parse_classifier_response("Sorry, I cannot help with that.");
    assert!(matches!(result, Err(auction_vision_common::Error::Parse(_))));

    let result = parse_classifier_response(r#"{"items": "none"}"#);
    assert!(result.is_err());
}

/// 空の応答は検出なし
#[test]
fn test_empty_classifier_response() {
    assert!(parse_classifier_response("").unwrap().is_empty());
    assert!(parse_classifier_response("   ").unwrap().is_empty());
}

/// 壊れた保存ファイルは空扱いにせずエラー
#[test]
fn test_corrupted_store_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("estimates.json");
    std::fs::write(&path, "[1, 2").unwrap();

    let result = JsonResultStore::open(&path);
    assert!(matches!(result, Err(AuctionVisionError::Store(_))));
}

/// 存在しないオークションの読み込みはエラーではなく None
#[test]
fn test_load_missing_auction() {
    let dir = tempdir().expect("Failed to create temp dir");
    let store = JsonResultStore::open(&dir.path().join("estimates.json")).unwrap();
    assert!(store.load("missing").unwrap().is_none());
}

/// 壊れた設定JSON
#[test]
fn test_invalid_config_json() {
    let result = serde_json::from_str::<Config>("{ model: }");
    assert!(result.is_err());
}
