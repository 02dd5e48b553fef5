//! Staging of caller-supplied image and audio references into the scratch area.

use crate::domain::assets::{AudioAsset, AudioKind, ImageAsset};
use crate::domain::jobs::ImageInput;
use crate::error::{RenderError, Result};
use crate::ports::fetch::RemoteFetcher;
use crate::ports::progress::ProgressSink;
use crate::ports::storage::StoragePort;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AssetMaterializer {
    storage: Arc<dyn StoragePort>,
    fetcher: Arc<dyn RemoteFetcher>,
    scratch_dir: PathBuf,
    /// Origin relative references are fetched from and staged files are served at.
    public_base_url: String,
}

impl AssetMaterializer {
    pub fn new(
        storage: Arc<dyn StoragePort>,
        fetcher: Arc<dyn RemoteFetcher>,
        scratch_dir: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            fetcher,
            scratch_dir: scratch_dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Stage every image, preserving caller order.
    pub async fn stage_images(
        &self,
        job_id: &str,
        images: &[ImageInput],
        progress: &dyn ProgressSink,
    ) -> Result<Vec<ImageAsset>> {
        let mut staged = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            let file_name = format!(
                "job_{}_img_{}.{}",
                job_id,
                index,
                extension_of(&image.url, "jpg")
            );
            let local_path = self.stage_reference(&image.url, &file_name).await?;
            staged.push(ImageAsset {
                source_reference: image.url.clone(),
                local_path,
                render_url: self.render_url(&file_name),
                display_duration_ms: image.duration,
                sequence_index: index,
            });
            progress
                .report((index + 1) as f64 / images.len().max(1) as f64)
                .await;
        }
        Ok(staged)
    }

    pub async fn stage_audio(
        &self,
        job_id: &str,
        reference: &str,
        kind: AudioKind,
    ) -> Result<AudioAsset> {
        let file_name = format!(
            "job_{}_{}.{}",
            job_id,
            kind.label(),
            extension_of(reference, "mp3")
        );
        let local_path = self.stage_reference(reference, &file_name).await?;
        Ok(AudioAsset {
            source_reference: reference.to_string(),
            local_path,
            render_url: self.render_url(&file_name),
            kind,
        })
    }

    /// Local storage first, then the network.
    async fn stage_reference(&self, reference: &str, file_name: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let dest = self.scratch_dir.join(file_name);

        let local_error = match self.storage.download(reference, &dest).await {
            Ok(()) => {
                debug!(reference, dest = %dest.display(), "staged from local storage");
                return Ok(dest);
            }
            Err(e) => e,
        };

        let url = self.absolute_url(reference);
        match self.fetcher.fetch(&url, &dest).await {
            Ok(bytes) => {
                debug!(reference, bytes, dest = %dest.display(), "staged from network");
                Ok(dest)
            }
            Err(remote_error) => {
                let _ = tokio::fs::remove_file(&dest).await;
                Err(RenderError::asset(
                    reference,
                    format!("local: {}; remote: {}", local_error, remote_error),
                ))
            }
        }
    }

    fn absolute_url(&self, reference: &str) -> String {
        if reference.contains("://") {
            reference.to_string()
        } else {
            format!(
                "{}/{}",
                self.public_base_url,
                reference.trim_start_matches('/')
            )
        }
    }

    fn render_url(&self, file_name: &str) -> String {
        format!("{}/temp/{}", self.public_base_url, file_name)
    }

    /// Remove staged files; failures are logged.
    pub async fn cleanup(&self, job_id: &str, files: &[PathBuf]) {
        for file in files {
            if let Err(e) = tokio::fs::remove_file(file).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(job_id, file = %file.display(), error = %e, "scratch cleanup failed");
                }
            }
        }
    }
}

/// Lower-cased file extension of a reference, ignoring query strings.
fn extension_of(reference: &str, default: &str) -> String {
    let path = reference
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or("");
    let name = path.rsplit('/').next().unwrap_or("");
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => default.to_string(),
    }
}
