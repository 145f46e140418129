//! OpenAI ビジョン連携
//!
//! 画像を data URL として chat-completions へ送り、
//! 応答JSONを共通パーサーで DetectedItem へ変換する

use super::VisionClassifier;
use crate::config::Config;
use crate::error::{AuctionVisionError, Result};
use async_trait::async_trait;
use auction_vision_common::{build_vision_prompt, parse_classifier_response, DetectedItem};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// chat-completions リクエスト
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

/// chat-completions レスポンス
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClassifier {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    temperature: f32,
}

impl OpenAiClassifier {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.get_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(config.classify_timeout())
            .build()
            .map_err(|e| AuctionVisionError::Config(format!("HTTPクライアント生成エラー: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl VisionClassifier for OpenAiClassifier {
    async fn classify(&self, image: &[u8], seen_item_names: &[String]) -> Result<Vec<DetectedItem>> {
        let request = build_request(&self.model, self.temperature, image, seen_item_names);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AuctionVisionError::Classification(format!("API呼び出しエラー: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(300).collect();
            return Err(AuctionVisionError::Classification(format!(
                "API error {}: {}",
                status, preview
            )));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| AuctionVisionError::Classification(format!("レスポンス形式エラー: {}", e)))?;

        let content = response_content(payload)?;
        debug!(chars = content.len(), "vision response received");

        parse_classifier_response(&content)
            .map_err(|e| AuctionVisionError::Classification(e.to_string()))
    }
}

fn build_request(model: &str, temperature: f32, image: &[u8], seen_item_names: &[String]) -> ChatRequest {
    let prompt = build_vision_prompt(seen_item_names, image_dimensions(image));
    let mime_type = image::guess_format(image)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/jpeg");
    let b64 = base64::engine::general_purpose::STANDARD.encode(image);

    ChatRequest {
        model: model.to_string(),
        messages: vec![Message {
            role: "user".to_string(),
            content: vec![
                ContentPart::Text { text: prompt },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{};base64,{}", mime_type, b64),
                    },
                },
            ],
        }],
        temperature,
    }
}

/// 空の content は「検出なし」
fn response_content(payload: ChatResponse) -> Result<String> {
    let choice = payload
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AuctionVisionError::Classification("choices が空です".into()))?;
    Ok(choice.message.content.unwrap_or_default())
}

fn image_dimensions(image: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(image))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
