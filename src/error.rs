use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuctionVisionError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`auction-vision config --set-api-key YOUR_KEY` または OPENAI_API_KEY で設定してください")]
    MissingApiKey,

    #[error("解析できる画像がありません: {0}")]
    NoImages(String),

    #[error("画像取得エラー: {0}")]
    ImageFetch(String),

    #[error("画像分類エラー: {0}")]
    Classification(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("保存エラー: {0}")]
    Store(String),

    #[error("見積もりが見つかりません: {0}")]
    NotFound(String),

    #[error("ワーカーエラー: {0}")]
    Worker(String),

    #[error("別の解析が実行中です: {0}")]
    RunInProgress(String),

    #[error("入力エラー: {0}")]
    Prompt(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] auction_vision_common::Error),
}

pub type Result<T> = std::result::Result<T, AuctionVisionError>;
