use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::message_limits::THREADS_MAX_CHARS;
use crate::config::{Config, RetryPolicy, REQUEST_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::notify::{publish_with_retry, Publisher};

#[derive(Debug, Clone)]
pub struct ThreadsSettings {
    pub api_url: String,
    pub token_url: String,
    pub account_id: String,
    pub long_lived_token: Option<String>,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub retry: RetryPolicy,
}

/// Two-step Threads post: create a media container, then publish it.
pub struct ThreadsPublisher {
    client: reqwest::Client,
    settings: ThreadsSettings,
    /// Fetched at most once per run.
    token: OnceCell<String>,
}

impl ThreadsPublisher {
    pub fn new(settings: ThreadsSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, settings, token: OnceCell::new() })
    }

    /// `None` when the account id or both token sources are missing.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        if !cfg.threads.is_complete() {
            return Ok(None);
        }
        let Some(account_id) = cfg.threads.account_id.clone() else {
            return Ok(None);
        };
        Self::new(ThreadsSettings {
            api_url: cfg.threads_api_url.clone(),
            token_url: cfg.threads_token_url.clone(),
            account_id,
            long_lived_token: cfg.threads.long_lived_token.clone(),
            app_id: cfg.threads.app_id.clone(),
            app_secret: cfg.threads.app_secret.clone(),
            retry: RetryPolicy::publish(),
        })
        .map(Some)
    }

    async fn access_token(&self) -> Result<&String> {
        self.token.get_or_try_init(|| self.request_token()).await
    }

    async fn request_token(&self) -> Result<String> {
        if let Some(token) = &self.settings.long_lived_token {
            debug!("[THREADS] using long-lived token");
            return Ok(token.clone());
        }
        let (Some(app_id), Some(app_secret)) = (&self.settings.app_id, &self.settings.app_secret)
        else {
            return Err(AppError::Config("no Threads token and no app id/secret".to_string()));
        };

        info!("[THREADS] requesting client-credentials token");
        let resp = self
            .client
            .get(&self.settings.token_url)
            .query(&[
                ("client_id", app_id.as_str()),
                ("client_secret", app_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        let body = checked_json(resp, "token exchange").await?;
        body.get("access_token")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
            .ok_or_else(|| AppError::Publish("token exchange: no access_token".to_string()))
    }

    async fn try_publish(&self, text: &str, image_url: Option<&str>) -> Result<()> {
        let token = self.access_token().await?;
        let base = format!("{}/{}", self.settings.api_url, self.settings.account_id);

        let mut form: Vec<(&str, &str)> = vec![("access_token", token.as_str()), ("text", text)];
        match image_url {
            Some(url) => {
                form.push(("media_type", "IMAGE"));
                form.push(("image_url", url));
            }
            None => form.push(("media_type", "TEXT")),
        }

        let resp = self.client.post(format!("{base}/threads")).form(&form).send().await?;
        let body = checked_json(resp, "container").await?;
        let container_id = match body.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(AppError::Publish("container: response has no id".to_string())),
        };
        debug!(container_id = %container_id, "[THREADS] container created");

        let resp = self
            .client
            .post(format!("{base}/threads_publish"))
            .form(&[("access_token", token.as_str()), ("creation_id", container_id.as_str())])
            .send()
            .await?;
        checked_json(resp, "publish").await?;
        Ok(())
    }
}

/// Body of a 2xx response as JSON; anything else is a publish error naming
/// `step`.
async fn checked_json(resp: reqwest::Response, step: &str) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        let sample: String = text.chars().take(300).collect();
        return Err(AppError::Publish(format!("{step}: status {}: {sample}", status.as_u16())));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl Publisher for ThreadsPublisher {
    fn name(&self) -> &'static str {
        "THREADS"
    }

    fn max_chars(&self) -> usize {
        THREADS_MAX_CHARS
    }

    async fn publish(&self, text: &str, image_url: Option<&str>) -> bool {
        let ok = publish_with_retry(self.name(), self.settings.retry, || {
            self.try_publish(text, image_url)
        })
        .await;
        if ok {
            info!("[THREADS] posted ({} chars, image={})", text.chars().count(), image_url.is_some());
        }
        ok
    }
}
