// Uploaded note images and attachments on the local filesystem
use std::path::PathBuf;

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} is not an image")]
    NotAnImage(String),

    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, MediaError::NotAnImage(_) | MediaError::EmptyUpload)
    }
}

/// A file part received from a form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Raster image types accepted for note images and the extension each is stored under.
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/bmp", "bmp"),
];

fn image_extension_for(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    IMAGE_TYPES
        .iter()
        .find(|(ty, _)| *ty == essence)
        .map(|(_, ext)| *ext)
}

impl Upload {
    /// Extension an image upload is stored under: the file name's own type when
    /// it is an accepted image, otherwise the declared content type.
    pub fn image_extension(&self) -> Option<&'static str> {
        mime_guess::from_path(&self.file_name)
            .first()
            .and_then(|m| image_extension_for(m.essence_str()))
            .or_else(|| self.content_type.as_deref().and_then(image_extension_for))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Attachment,
}

impl MediaKind {
    fn dir(&self) -> &'static str {
        match self {
            MediaKind::Image => "posts",
            MediaKind::Attachment => "files",
        }
    }
}

/// Where a stored upload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    /// Path relative to the media root, e.g. `posts/<uuid>_cat.png`
    pub path: String,
    /// The name the uploader gave the file
    pub file_name: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist an upload. Images must be an accepted raster type and are renamed
    /// to that type's extension.
    async fn save(&self, kind: MediaKind, upload: &Upload) -> Result<StoredMedia, MediaError>;

    /// Public URL for a stored path.
    fn url(&self, path: &str) -> String;
}

pub struct LocalMediaStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self { root, url_prefix }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn save(&self, kind: MediaKind, upload: &Upload) -> Result<StoredMedia, MediaError> {
        if upload.data.is_empty() {
            return Err(MediaError::EmptyUpload);
        }
        let file_name = match kind {
            MediaKind::Image => {
                let ext = upload
                    .image_extension()
                    .ok_or_else(|| MediaError::NotAnImage(upload.file_name.clone()))?;
                format!("{}.{ext}", file_stem(&sanitize_file_name(&upload.file_name)))
            }
            MediaKind::Attachment => sanitize_file_name(&upload.file_name),
        };
        let stored_name = format!("{}_{file_name}", uuid::Uuid::now_v7().simple());
        let dir = self.root.join(kind.dir());
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(&stored_name), &upload.data).await?;

        let path = format!("{}/{}", kind.dir(), stored_name);
        tracing::debug!(%path, bytes = upload.data.len(), "Stored upload");
        Ok(StoredMedia {
            path,
            file_name: upload.file_name.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.url_prefix.trim_end_matches('/'), path)
    }
}

/// Keep the last path segment and replace anything outside a conservative set.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}

fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}
