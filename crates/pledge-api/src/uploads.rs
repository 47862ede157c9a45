use std::collections::HashMap;
use std::path::Path;

use axum::body::Bytes;
use axum::extract::Multipart;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// A file part of a multipart form.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// A buffered `multipart/form-data` body: text fields plus file parts.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            warn!("Malformed multipart body: {}", e);
            ApiError::BadRequest("Malformed form data")
        })? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(|e| {
                warn!("Failed to read multipart field {}: {}", name, e);
                ApiError::BadRequest("Malformed form data")
            })?;

            match file_name {
                // Browsers send an empty file part when nothing was chosen
                Some(_) if bytes.is_empty() => {}
                Some(file_name) => {
                    form.files.insert(
                        name,
                        UploadedFile {
                            file_name: Some(file_name),
                            bytes,
                        },
                    );
                }
                None => {
                    let text = String::from_utf8(bytes.to_vec())
                        .map_err(|_| ApiError::BadRequest("Malformed form data"))?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    /// Trimmed, non-empty text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Non-empty text field exactly as sent.
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}

/// Store an uploaded file under `dir` with a generated name and return that name.
pub async fn save_upload(dir: &Path, file: &UploadedFile) -> anyhow::Result<String> {
    let file_name = stored_file_name(file.file_name.as_deref());

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(&file_name);
    let mut out = tokio::fs::File::create(&path).await?;
    out.write_all(&file.bytes).await?;
    out.flush().await?;

    Ok(file_name)
}

/// `<millis>-<uuid>[.ext]`; only a short alphanumeric extension of the
/// client's name survives, so nothing it sends can escape the directory.
fn stored_file_name(original: Option<&str>) -> String {
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    format!("{}-{}{}", Utc::now().timestamp_millis(), Uuid::new_v4(), ext)
}
