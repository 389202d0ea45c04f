use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::message_limits::MICROBLOG_MAX_CHARS;
use crate::config::{Config, RetryPolicy, REQUEST_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::notify::{publish_with_retry, Publisher};

#[derive(Debug, Clone)]
pub struct MicroblogSettings {
    pub api_url: String,
    pub access_token: String,
    pub retry: RetryPolicy,
}

/// Posts through the X API v2: optional media upload, then the post itself.
pub struct MicroblogPublisher {
    client: reqwest::Client,
    settings: MicroblogSettings,
}

impl MicroblogPublisher {
    pub fn new(settings: MicroblogSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, settings })
    }

    /// `None` without an access token.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        let Some(token) = cfg.microblog_token.clone() else {
            return Ok(None);
        };
        Self::new(MicroblogSettings {
            api_url: cfg.microblog_api_url.clone(),
            access_token: token,
            retry: RetryPolicy::publish(),
        })
        .map(Some)
    }

    /// Download the product image and upload it; returns the media id.
    async fn upload_image(&self, image_url: &str) -> Result<String> {
        let resp = self.client.get(image_url).send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Publish(format!(
                "image download: status {}",
                resp.status().as_u16()
            )));
        }
        let bytes = resp.bytes().await?;
        debug!(size = bytes.len(), "[MICROBLOG] image downloaded");

        let form = Form::new()
            .text("media_category", "tweet_image")
            .part("media", Part::bytes(bytes.to_vec()).file_name("image.jpg"));
        let resp = self
            .client
            .post(format!("{}/2/media/upload", self.settings.api_url))
            .bearer_auth(&self.settings.access_token)
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(AppError::Publish(format!("media upload: status {}: {text}", status.as_u16())));
        }
        let body: Value = serde_json::from_str(&text)?;
        media_id(&body).ok_or_else(|| AppError::Publish("media upload: no media id".to_string()))
    }

    async fn try_publish(&self, text: &str, image_url: Option<&str>) -> Result<()> {
        let media = match image_url {
            Some(url) => match self.upload_image(url).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("[MICROBLOG] image skipped, posting text only: {e}");
                    None
                }
            },
            None => None,
        };

        let mut payload = json!({ "text": text });
        if let Some(id) = &media {
            payload["media"] = json!({ "media_ids": [id] });
        }

        let resp = self
            .client
            .post(format!("{}/2/tweets", self.settings.api_url))
            .bearer_auth(&self.settings.access_token)
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let sample: String = body.chars().take(300).collect();
            return Err(AppError::Publish(format!("post: status {}: {sample}", status.as_u16())));
        }
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        debug!(
            post_id = body.pointer("/data/id").and_then(|v| v.as_str()).unwrap_or("?"),
            "[MICROBLOG] post created"
        );
        Ok(())
    }
}

/// v2 answers `{"data": {"id"}}`, the v1.1 shape is `{"media_id_string"}`.
fn media_id(body: &Value) -> Option<String> {
    body.pointer("/data/id")
        .or_else(|| body.get("media_id_string"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Every link counts as this many, whatever its length.
const LINK_WEIGHT: usize = 23;

/// Post length as the X API counts it: links are `LINK_WEIGHT`, characters in
/// the Latin and general punctuation ranges are 1, everything else (CJK,
/// emoji, `…`) is 2.
pub fn weighted_len(text: &str) -> usize {
    text.split_inclusive(char::is_whitespace)
        .map(|piece| {
            let word = piece.trim_end_matches(char::is_whitespace);
            let gap = &piece[word.len()..];
            if word.starts_with("https://") || word.starts_with("http://") {
                LINK_WEIGHT + gap.chars().map(char_weight).sum::<usize>()
            } else {
                piece.chars().map(char_weight).sum()
            }
        })
        .sum()
}

fn char_weight(c: char) -> usize {
    match c as u32 {
        0x0000..=0x10FF | 0x2000..=0x200D | 0x2010..=0x201F | 0x2032..=0x2037 => 1,
        _ => 2,
    }
}

#[async_trait]
impl Publisher for MicroblogPublisher {
    fn name(&self) -> &'static str {
        "MICROBLOG"
    }

    fn max_chars(&self) -> usize {
        MICROBLOG_MAX_CHARS
    }

    fn text_len(&self, text: &str) -> usize {
        weighted_len(text)
    }

    async fn publish(&self, text: &str, image_url: Option<&str>) -> bool {
        let ok = publish_with_retry(self.name(), self.settings.retry, || {
            self.try_publish(text, image_url)
        })
        .await;
        if ok {
            info!("[MICROBLOG] posted (weight {}, image={})", weighted_len(text), image_url.is_some());
        }
        ok
    }
}
