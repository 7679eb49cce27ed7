//! Storage for downloaded call recordings and their transcripts
//!
//! Files are laid out as base_path/YYYY/MM/DD/{call_id}_{recording_sid}.{ext}
//! so a retried job overwrites its own earlier attempt instead of adding a copy.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Storage quota exceeded: {used}GB used of {quota}GB")]
    QuotaExceeded { used: f64, quota: f64 },

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone)]
pub struct StorageInfo {
    pub total_files: u64,
    pub total_size_bytes: u64,
    pub available_space_bytes: u64,
}

/// Where a stored file landed
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub file_path: String,
    pub file_size: u64,
    pub stored_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait RecordingStorage: Send + Sync {
    async fn store_recording(
        &self,
        call_id: i64,
        recording_sid: &str,
        data: Vec<u8>,
        format: &str,
    ) -> StorageResult<StoredFile>;

    async fn store_transcript(&self, call_id: i64, recording_sid: &str, text: &str) -> StorageResult<StoredFile>;

    async fn get_recording(&self, file_path: &str) -> StorageResult<Vec<u8>>;

    async fn delete_recording(&self, file_path: &str) -> StorageResult<()>;

    async fn get_storage_info(&self) -> StorageResult<StorageInfo>;

    /// Check if storage quota allows storing a file of given size
    async fn check_quota(&self, file_size: u64) -> StorageResult<bool>;
}

pub struct LocalFileStorage {
    base_path: PathBuf,
    max_storage_bytes: u64,
}

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

impl LocalFileStorage {
    pub fn new(base_path: impl AsRef<Path>, max_storage_gb: f64) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            max_storage_bytes: (max_storage_gb * GB) as u64,
        }
    }

    pub async fn init(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        tracing::info!("Initialized recording storage at: {:?}", self.base_path);
        Ok(())
    }

    fn generate_path(&self, call_id: i64, recording_sid: &str, extension: &str) -> StorageResult<PathBuf> {
        if recording_sid.is_empty() || !recording_sid.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StorageError::InvalidPath(recording_sid.to_string()));
        }

        let date_path = Utc::now().format("%Y/%m/%d").to_string();
        let filename = format!("{}_{}.{}", call_id, recording_sid, extension);
        Ok(self.base_path.join(date_path).join(filename))
    }

    fn to_relative_path(&self, absolute_path: &Path) -> StorageResult<String> {
        absolute_path
            .strip_prefix(&self.base_path)
            .map_err(|_| StorageError::InvalidPath(format!("{:?}", absolute_path)))?
            .to_str()
            .ok_or_else(|| StorageError::InvalidPath(format!("{:?}", absolute_path)))
            .map(|s| s.to_string())
    }

    fn to_absolute_path(&self, relative_path: &str) -> StorageResult<PathBuf> {
        if relative_path.split('/').any(|part| part == "..") {
            return Err(StorageError::InvalidPath(relative_path.to_string()));
        }
        Ok(self.base_path.join(relative_path))
    }

    async fn calculate_usage(&self) -> StorageResult<(u64, u64)> {
        let mut total_files = 0u64;
        let mut total_size = 0u64;

        if !self.base_path.exists() {
            return Ok((0, 0));
        }

        let mut entries = vec![self.base_path.clone()];

        while let Some(path) = entries.pop() {
            let mut read_dir = fs::read_dir(&path).await?;

            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let metadata = entry.metadata().await?;

                if metadata.is_dir() {
                    entries.push(path);
                } else if metadata.is_file() {
                    total_files += 1;
                    total_size += metadata.len();
                }
            }
        }

        Ok((total_files, total_size))
    }

    async fn write(&self, absolute_path: &Path, data: &[u8]) -> StorageResult<StoredFile> {
        let file_size = data.len() as u64;

        if !self.check_quota(file_size).await? {
            let (_, used_bytes) = self.calculate_usage().await?;
            return Err(StorageError::QuotaExceeded {
                used: used_bytes as f64 / GB,
                quota: self.max_storage_bytes as f64 / GB,
            });
        }

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(absolute_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;

        Ok(StoredFile {
            file_path: self.to_relative_path(absolute_path)?,
            file_size,
            stored_at: Utc::now(),
        })
    }

    /// Clean up empty directories recursively up to base_path
    async fn cleanup_empty_dirs(dir: &Path, base_path: &Path) -> std::io::Result<()> {
        if dir == base_path {
            return Ok(());
        }

        let mut entries = fs::read_dir(dir).await?;
        if entries.next_entry().await?.is_none() {
            fs::remove_dir(dir).await?;

            if let Some(parent) = dir.parent() {
                let _ = Box::pin(Self::cleanup_empty_dirs(parent, base_path)).await;
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordingStorage for LocalFileStorage {
    async fn store_recording(
        &self,
        call_id: i64,
        recording_sid: &str,
        data: Vec<u8>,
        format: &str,
    ) -> StorageResult<StoredFile> {
        let absolute_path = self.generate_path(call_id, recording_sid, format)?;
        let stored = self.write(&absolute_path, &data).await?;

        tracing::info!(
            "Stored recording {} for call {} at {} (size: {} bytes)",
            recording_sid,
            call_id,
            stored.file_path,
            stored.file_size
        );
        Ok(stored)
    }

    async fn store_transcript(&self, call_id: i64, recording_sid: &str, text: &str) -> StorageResult<StoredFile> {
        let absolute_path = self.generate_path(call_id, recording_sid, "txt")?;
        let stored = self.write(&absolute_path, text.as_bytes()).await?;
        tracing::info!("Stored transcript for recording {} at {}", recording_sid, stored.file_path);
        Ok(stored)
    }

    async fn get_recording(&self, file_path: &str) -> StorageResult<Vec<u8>> {
        let absolute_path = self.to_absolute_path(file_path)?;

        if !absolute_path.exists() {
            return Err(StorageError::FileNotFound(file_path.to_string()));
        }

        let mut file = fs::File::open(&absolute_path).await?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;

        tracing::debug!("Retrieved recording from {} ({} bytes)", file_path, data.len());
        Ok(data)
    }

    async fn delete_recording(&self, file_path: &str) -> StorageResult<()> {
        let absolute_path = self.to_absolute_path(file_path)?;

        if !absolute_path.exists() {
            return Err(StorageError::FileNotFound(file_path.to_string()));
        }

        fs::remove_file(&absolute_path).await?;
        tracing::info!("Deleted recording at {}", file_path);

        if let Some(parent) = absolute_path.parent() {
            let _ = Self::cleanup_empty_dirs(parent, &self.base_path).await;
        }

        Ok(())
    }

    async fn get_storage_info(&self) -> StorageResult<StorageInfo> {
        let (total_files, total_size_bytes) = self.calculate_usage().await?;
        let available_space_bytes = self.max_storage_bytes.saturating_sub(total_size_bytes);

        Ok(StorageInfo {
            total_files,
            total_size_bytes,
            available_space_bytes,
        })
    }

    async fn check_quota(&self, file_size: u64) -> StorageResult<bool> {
        let (_, used_bytes) = self.calculate_usage().await?;
        Ok(used_bytes + file_size <= self.max_storage_bytes)
    }
}
