use crate::error::{RenderError, Result};
use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Filesystem storage.
///
/// Keys are relative paths or URLs on one of the local origins. Keys under a
/// mounted prefix are looked up in the mount first, then under the root.
#[derive(Clone, Debug)]
pub struct FsAdapter {
    root: PathBuf,
    mounts: Vec<(PathBuf, PathBuf)>,
    local_origins: Vec<String>,
}

impl FsAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounts: Vec::new(),
            local_origins: Vec::new(),
        }
    }

    /// Serve keys starting with `prefix` from `dir`.
    pub fn mount(mut self, prefix: &str, dir: impl Into<PathBuf>) -> Self {
        let prefix: PathBuf = prefix.split('/').filter(|part| !part.is_empty()).collect();
        self.mounts.push((prefix, dir.into()));
        self
    }

    /// Treat absolute URLs on `origin` (`scheme://host[:port]`) as local keys.
    pub fn with_local_origin(mut self, origin: &str) -> Self {
        self.local_origins
            .push(origin.trim_end_matches('/').to_ascii_lowercase());
        self
    }

    /// Candidate paths for `key`, most specific first. URLs on a foreign
    /// origin have none.
    pub fn candidates(&self, key: &str) -> Result<Vec<PathBuf>> {
        let (origin, path_part) = split_key(key);
        let relative = storage_relative_path(key, path_part)?;
        if let Some(origin) = origin {
            if !self.local_origins.contains(&origin.to_ascii_lowercase()) {
                return Ok(Vec::new());
            }
        }

        let mut candidates = Vec::new();
        for (prefix, dir) in &self.mounts {
            if let Ok(rest) = relative.strip_prefix(prefix) {
                if !rest.as_os_str().is_empty() {
                    candidates.push(dir.join(rest));
                }
            }
        }
        let under_root = self.root.join(&relative);
        if !candidates.contains(&under_root) {
            candidates.push(under_root);
        }
        Ok(candidates)
    }
}

/// Origin (for URLs) and path component of a storage key.
fn split_key(key: &str) -> (Option<&str>, &str) {
    let (origin, path) = match key.find("://") {
        Some(scheme_end) => {
            let after = scheme_end + 3;
            match key[after..].find('/') {
                Some(i) => (Some(&key[..after + i]), &key[after + i..]),
                None => (Some(key), ""),
            }
        }
        None => (None, key),
    };
    let path = path.split(|c| c == '?' || c == '#').next().unwrap_or("");
    (origin, path)
}

/// Relative storage path for `key`, rejecting parent traversal.
fn storage_relative_path(key: &str, path_part: &str) -> Result<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(path_part).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(RenderError::asset(key, "invalid storage key"));
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(RenderError::asset(key, "empty storage key"));
    }
    Ok(relative)
}

#[async_trait]
impl StoragePort for FsAdapter {
    async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        for candidate in self.candidates(key)? {
            if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                continue;
            }
            if candidate == local_path {
                return Ok(());
            }
            if let Some(parent) = local_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&candidate, local_path).await?;
            return Ok(());
        }
        Err(RenderError::asset(key, "not found in local storage"))
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        let (_, path_part) = split_key(key);
        let key_path = self.root.join(storage_relative_path(key, path_part)?);
        if key_path != local_path {
            if let Some(parent) = key_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(local_path, &key_path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn downloads_relative_keys() {
        let public = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        tokio::fs::create_dir_all(public.path().join("musics"))
            .await
            .unwrap();
        tokio::fs::write(public.path().join("musics/ambient-1.mp3"), b"ID3")
            .await
            .unwrap();

        let fs = FsAdapter::new(public.path());
        let dest = scratch.path().join("job_music.mp3");
        fs.download("/musics/ambient-1.mp3", &dest).await.unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"ID3");
    }

    #[tokio::test]
    async fn own_urls_resolve_to_mounted_uploads() {
        let public = tempdir().unwrap();
        let uploads = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        tokio::fs::write(uploads.path().join("kitchen.jpg"), b"jpeg")
            .await
            .unwrap();

        let fs = FsAdapter::new(public.path())
            .mount("/uploads", uploads.path())
            .with_local_origin("http://localhost:3001/");
        let dest = scratch.path().join("img.jpg");
        fs.download("http://localhost:3001/uploads/kitchen.jpg?v=2", &dest)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"jpeg");

        let relative = scratch.path().join("relative.jpg");
        fs.download("/uploads/kitchen.jpg", &relative).await.unwrap();
        assert_eq!(tokio::fs::read(&relative).await.unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn foreign_urls_are_never_served_from_disk() {
        let public = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        tokio::fs::create_dir_all(public.path().join("listing-42"))
            .await
            .unwrap();
        tokio::fs::write(public.path().join("photo.jpg"), b"other listing")
            .await
            .unwrap();
        tokio::fs::write(public.path().join("listing-42/photo.jpg"), b"same path")
            .await
            .unwrap();

        let fs = FsAdapter::new(public.path()).with_local_origin("http://localhost:3001");
        assert!(fs
            .candidates("https://cdn.example.com/listing-42/photo.jpg")
            .unwrap()
            .is_empty());

        let dest = scratch.path().join("img.jpg");
        let err = fs
            .download("https://cdn.example.com/listing-42/photo.jpg", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::AssetUnavailable { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn bare_file_names_are_not_searched() {
        let fs = FsAdapter::new("/srv/public").mount("uploads", "/srv/uploads");
        assert_eq!(
            fs.candidates("/listing-42/photo.jpg").unwrap(),
            vec![PathBuf::from("/srv/public/listing-42/photo.jpg")]
        );
        assert_eq!(
            fs.candidates("/uploads/a.jpg").unwrap(),
            vec![
                PathBuf::from("/srv/uploads/a.jpg"),
                PathBuf::from("/srv/public/uploads/a.jpg"),
            ]
        );
    }

    #[tokio::test]
    async fn missing_keys_are_unavailable() {
        let public = tempdir().unwrap();
        let fs = FsAdapter::new(public.path());
        let err = fs
            .download("/uploads/nope.jpg", &public.path().join("out.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::AssetUnavailable { .. }));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let fs = FsAdapter::new("/srv/public");
        assert!(fs.candidates("../etc/passwd").is_err());
        assert!(fs.candidates("http://evil/../../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn upload_copies_under_first_root() {
        let outputs = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let rendered = scratch.path().join("render.mp4");
        tokio::fs::write(&rendered, b"mp4").await.unwrap();

        let fs = FsAdapter::new(outputs.path());
        fs.upload(&rendered, "abc.mp4").await.unwrap();
        assert_eq!(
            tokio::fs::read(outputs.path().join("abc.mp4")).await.unwrap(),
            b"mp4"
        );
    }
}
