//! Filesystem storage for post images, served back under `/media/`.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::domain::slug::derive_slug;

/// Directory (relative to the media root) holding post images.
pub const POSTS_PREFIX: &str = "posts";
const MAX_NAME_ATTEMPTS: usize = 8;
const SUFFIX_LEN: usize = 7;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error("could not find a free file name for `{name}`")]
    NameExhausted { name: String },
}

impl MediaError {
    pub fn is_not_found(&self) -> bool {
        match self {
            MediaError::InvalidPath => true,
            MediaError::Io(err) => err.kind() == ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredMedia {
    /// Path relative to the media root, e.g. `posts/cat.gif`.
    pub stored_path: String,
}

#[derive(Debug)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store an image under `posts/`, keeping the uploaded name when it is free.
    ///
    /// A taken name gets a short random suffix (`cat_3f9a1c2.gif`); existing
    /// files are never overwritten.
    pub async fn store_post_image(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredMedia, MediaError> {
        if data.is_empty() {
            return Err(MediaError::EmptyPayload);
        }

        let (stem, extension) = sanitize_filename(original_name);
        fs::create_dir_all(self.root.join(POSTS_PREFIX)).await?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let filename = if attempt == 0 {
                join_name(&stem, extension.as_deref())
            } else {
                let suffix = Uuid::new_v4().simple().to_string();
                join_name(
                    &format!("{stem}_{}", &suffix[..SUFFIX_LEN]),
                    extension.as_deref(),
                )
            };
            let stored_path = format!("{POSTS_PREFIX}/{filename}");
            let absolute = self.resolve(&stored_path)?;

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&absolute)
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    debug!(
                        target = "penfeed::media",
                        path = %stored_path,
                        "media name taken, retrying with suffix"
                    );
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if let Err(err) = write_all(&mut file, &data).await {
                drop(file);
                let _ = fs::remove_file(&absolute).await;
                return Err(err.into());
            }

            return Ok(StoredMedia { stored_path });
        }

        Err(MediaError::NameExhausted {
            name: original_name.to_string(),
        })
    }

    /// Read a stored payload into memory.
    pub async fn read(&self, stored_path: &str) -> Result<Bytes, MediaError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Delete a stored file. Missing files are not an error.
    pub async fn remove(&self, stored_path: &str) -> Result<(), MediaError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, MediaError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(MediaError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

async fn write_all(file: &mut fs::File, data: &[u8]) -> Result<(), std::io::Error> {
    file.write_all(data).await?;
    file.flush().await
}

fn sanitize_filename(original: &str) -> (String, Option<String>) {
    // Browsers on some platforms send the full client path.
    let basename = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let path = Path::new(basename);

    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .and_then(|value| derive_slug(value).ok())
        .unwrap_or_else(|| "image".to_string());

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty() && value.chars().all(|ch| ch.is_ascii_alphanumeric()));

    (stem, extension)
}

fn join_name(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}
