use crate::error::{AppError, AppResult};
use crate::models::{ImageType, UploadedFile};
use crate::storage::ensure_dir;
use axum::extract::multipart::{Multipart, MultipartError};
use chrono::Utc;
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Multipart field that carries the files.
    pub field: String,
    pub max_file_size: u64,
    pub max_files: usize,
}

/// A validated file held in memory until the whole batch has been checked.
#[derive(Debug)]
pub struct PendingFile {
    pub meta: UploadedFile,
    pub data: Vec<u8>,
}

/// Validates multipart uploads and writes accepted batches to disk.
///
/// Every file in a batch is checked before the first one is written, so a
/// rejected batch leaves nothing behind.
#[derive(Debug)]
pub struct UploadGatekeeper {
    dir: PathBuf,
    limits: UploadLimits,
}

impl UploadGatekeeper {
    pub fn new(dir: impl Into<PathBuf>, limits: UploadLimits) -> Self {
        Self {
            dir: dir.into(),
            limits,
        }
    }

    /// Reads, validates and stores one upload batch. Returns the stored
    /// names in submission order.
    pub async fn accept(&self, multipart: &mut Multipart, user_id: u64) -> AppResult<Vec<String>> {
        let batch = self.read_batch(multipart).await?;
        self.store(batch, user_id).await
    }

    pub async fn read_batch(&self, multipart: &mut Multipart) -> AppResult<Vec<PendingFile>> {
        let mut batch: Vec<PendingFile> = Vec::new();

        while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
            let original_name = match field.file_name() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => continue,
            };
            if field.name() != Some(self.limits.field.as_str()) {
                return Err(AppError::UnexpectedField(self.limits.field.clone()));
            }

            check_count(batch.len() + 1, self.limits.max_files)?;
            let mime = declared_mime(field.content_type(), &original_name);
            let image = check_type(&original_name, &mime)?;

            let mut data = Vec::new();
            while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                check_size(
                    &original_name,
                    (data.len() + chunk.len()) as u64,
                    self.limits.max_file_size,
                )?;
                data.extend_from_slice(&chunk);
            }

            batch.push(PendingFile {
                meta: UploadedFile {
                    stored_name: stored_name(&original_name),
                    original_name,
                    mime_type: image,
                    size_bytes: data.len() as u64,
                },
                data,
            });
        }

        Ok(batch)
    }

    /// Writes a validated batch. If any write fails, files already written
    /// for this batch are removed again.
    pub async fn store(&self, batch: Vec<PendingFile>, user_id: u64) -> AppResult<Vec<String>> {
        if batch.is_empty() {
            return Err(AppError::EmptyUpload);
        }

        ensure_dir(&self.dir).await.map_err(|e| {
            AppError::Internal(format!(
                "failed to prepare storage directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let mut written: Vec<String> = Vec::with_capacity(batch.len());
        for file in batch {
            let path = self.dir.join(&file.meta.stored_name);
            if let Err(e) = write_new(&path, &file.data).await {
                self.discard(&written).await;
                return Err(AppError::Internal(format!(
                    "failed to write {}: {e}",
                    file.meta.stored_name
                )));
            }

            tracing::info!(
                "User {} uploaded {} as {} ({}, {} bytes)",
                user_id,
                file.meta.original_name,
                file.meta.stored_name,
                file.meta.mime_type.as_mime(),
                file.meta.size_bytes
            );
            written.push(file.meta.stored_name);
        }

        Ok(written)
    }

    async fn discard(&self, names: &[String]) {
        for name in names {
            if let Err(e) = tokio::fs::remove_file(self.dir.join(name)).await {
                tracing::warn!("Failed to remove partial upload {}: {}", name, e);
            }
        }
    }
}

async fn write_new(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::Multipart(err.body_text())
}

/// The part's declared content type, or a guess from the file name.
pub fn declared_mime(content_type: Option<&str>, file_name: &str) -> String {
    match content_type {
        Some(ct) if !ct.is_empty() => ct.to_string(),
        _ => mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

pub fn check_type(file_name: &str, mime: &str) -> AppResult<ImageType> {
    ImageType::from_mime(mime).ok_or_else(|| AppError::UnsupportedMedia {
        file: file_name.to_string(),
        mime: mime.to_string(),
    })
}

pub fn check_size(file_name: &str, size: u64, limit: u64) -> AppResult<()> {
    if size > limit {
        return Err(AppError::PayloadTooLarge {
            file: file_name.to_string(),
            limit,
        });
    }
    Ok(())
}

pub fn check_count(count: usize, limit: usize) -> AppResult<()> {
    if count > limit {
        return Err(AppError::TooManyFiles { limit });
    }
    Ok(())
}

/// `<unix nanos>-<random suffix><.ext>`, keeping only the original extension.
pub fn stored_name(original_name: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();

    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    format!("{nanos}-{suffix}{ext}")
}
