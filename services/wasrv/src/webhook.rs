//! Inbound message forwarding
//!
//! Text messages are forwarded as JSON; media is written under the media
//! directory first and the event carries the file path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::client::{InboundContent, InboundMessage};
use crate::core::config::{MediaConfig, WebhookConfig};
use crate::error::{ErrorExt, Result};

/// Receives messages arriving on a device session
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle_inbound(&self, device_id: &str, message: InboundMessage);
}

/// Payload posted to the webhook URL
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookEvent {
    Text {
        device: String,
        from: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Media {
        device: String,
        from: String,
        media_type: String,
        file_path: String,
        timestamp: DateTime<Utc>,
    },
}

fn media_extension(media_type: &str) -> &'static str {
    match media_type {
        "imageMessage" => ".jpg",
        "videoMessage" => ".mp4",
        "documentMessage" => ".pdf",
        "audioMessage" => ".mp3",
        _ => ".bin",
    }
}

/// Write inbound media as `<dir>/<mediaType>_<millis><ext>`
pub async fn save_media_file(dir: &Path, media_type: &str, data: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .io_error("create media directory")?;
    let file_name = format!(
        "{}_{}{}",
        media_type,
        Utc::now().timestamp_millis(),
        media_extension(media_type)
    );
    let path = dir.join(file_name);
    tokio::fs::write(&path, data)
        .await
        .io_error("write media file")?;
    Ok(path)
}

pub struct WebhookForwarder {
    http_client: HttpClient,
    url: Option<String>,
    media_dir: PathBuf,
}

impl WebhookForwarder {
    pub fn new(webhook: &WebhookConfig, media: &MediaConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(webhook.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http_client,
            url: webhook.url.clone().filter(|u| !u.trim().is_empty()),
            media_dir: media.dir.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Turn an inbound message into a webhook event, saving media to disk
    pub async fn prepare(&self, device_id: &str, message: InboundMessage) -> Result<WebhookEvent> {
        let timestamp = Utc::now();
        match message.content {
            InboundContent::Text(text) => {
                info!("[{}] message from {}", device_id, message.from);
                Ok(WebhookEvent::Text {
                    device: device_id.to_string(),
                    from: message.from,
                    message: text,
                    timestamp,
                })
            }
            InboundContent::Media { media_type, data } => {
                let path = save_media_file(&self.media_dir, &media_type, &data).await?;
                info!(
                    "[{}] {} from {} saved to {}",
                    device_id,
                    media_type,
                    message.from,
                    path.display()
                );
                Ok(WebhookEvent::Media {
                    device: device_id.to_string(),
                    from: message.from,
                    media_type,
                    file_path: path.display().to_string(),
                    timestamp,
                })
            }
        }
    }

    pub async fn forward(&self, event: &WebhookEvent) {
        let Some(url) = self.url.as_deref() else {
            debug!("No webhook URL configured, skipping");
            return;
        };
        match self.http_client.post(url).json(event).send().await {
            Ok(response) if response.status().is_success() => debug!("Webhook delivered"),
            Ok(response) => warn!("Webhook rejected with status {}", response.status()),
            Err(e) => error!("Failed to send webhook: {}", e),
        }
    }
}

#[async_trait]
impl InboundHandler for WebhookForwarder {
    async fn handle_inbound(&self, device_id: &str, message: InboundMessage) {
        match self.prepare(device_id, message).await {
            Ok(event) => self.forward(&event).await,
            Err(e) => error!("[{}] inbound message dropped: {}", device_id, e),
        }
    }
}
