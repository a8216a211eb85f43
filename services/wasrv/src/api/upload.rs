//! Multipart form reading for media uploads

use std::collections::HashMap;

use axum::extract::{multipart::MultipartError, Multipart};
use bytes::Bytes;
use tracing::debug;

use common::AppError;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// The `file` part plus every text field of the form
#[derive(Debug, Default)]
pub struct MediaForm {
    pub file: Option<UploadedFile>,
    fields: HashMap<String, String>,
}

impl MediaForm {
    /// Trimmed text field; blank counts as absent
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    let status = e.status();
    if status == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        AppError::payload_too_large("Uploaded file exceeds the size limit")
    } else {
        AppError::bad_request(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// Read the whole form, rejecting files larger than `max_file_bytes`
pub async fn read_media_form(
    multipart: &mut Multipart,
    max_file_bytes: usize,
) -> Result<MediaForm, AppError> {
    let mut form = MediaForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "file" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let mime_type = field
                .content_type()
                .unwrap_or(DEFAULT_MIME_TYPE)
                .to_string();
            let data = field.bytes().await.map_err(multipart_error)?;
            if data.len() > max_file_bytes {
                return Err(AppError::payload_too_large(format!(
                    "Uploaded file exceeds the {} byte limit",
                    max_file_bytes
                )));
            }
            debug!("Received upload {} ({}, {} bytes)", filename, mime_type, data.len());
            form.file = Some(UploadedFile {
                filename,
                mime_type,
                data,
            });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}
