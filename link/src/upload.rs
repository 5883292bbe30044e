//! Image upload to the external image host.
//!
//! Images are posted as multipart form data (`image`, `name`) and the public
//! URL from the response is returned. Only `image/*` content is accepted.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use chrono::Utc;
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Result, VeneredLinkError};

pub const DEFAULT_UPLOAD_ENDPOINT: &str = "https://api.imgbb.com/1/upload";

/// Where an image will be shown. Used as the file name prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageCategory {
    #[default]
    Posts,
    Messages,
    Profiles,
}

impl ImageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageCategory::Posts => "posts",
            ImageCategory::Messages => "messages",
            ImageCategory::Profiles => "profiles",
        }
    }
}

impl fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<UploadData>,
    #[serde(default)]
    error: Option<UploadFailure>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    display_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadFailure {
    #[serde(default)]
    message: Option<String>,
}

impl UploadResponse {
    fn into_url(self) -> Result<String> {
        if !self.success {
            let reason = self
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "image host rejected the upload".to_string());
            return Err(VeneredLinkError::UploadError(reason));
        }
        self.data
            .and_then(|d| d.url.filter(|u| !u.is_empty()).or(d.display_url))
            .filter(|u| !u.is_empty())
            .ok_or_else(|| VeneredLinkError::UploadError("no public URL in response".into()))
    }
}

/// `image/*` type for common extensions.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// `(base, file_name)` as `{category}_{millis}_{suffix}` and `{base}.{ext}`.
fn object_name(category: ImageCategory, file_name: &str, millis: i64, suffix: &str) -> (String, String) {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .unwrap_or("jpg");
    let base = format!("{}_{}_{}", category, millis, suffix);
    let full = format!("{}.{}", base, ext);
    (base, full)
}

/// Uploads images with one API key.
#[derive(Clone)]
pub struct ImageUploader {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl fmt::Debug for ImageUploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUploader")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ImageUploader {
    pub fn new(http_client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http_client,
            endpoint: DEFAULT_UPLOAD_ENDPOINT.to_string(),
            api_key,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().map_or(false, |k| !k.is_empty())
    }

    /// Upload raw image bytes and return the public URL.
    pub async fn upload(
        &self,
        data: impl Into<Bytes>,
        file_name: &str,
        content_type: &str,
        category: ImageCategory,
    ) -> Result<String> {
        if !content_type.starts_with("image/") {
            return Err(VeneredLinkError::ValidationError(format!(
                "only images can be uploaded, got {}",
                content_type
            )));
        }
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                VeneredLinkError::ConfigurationError("image upload key is not configured".into())
            })?;

        let suffix = Uuid::new_v4().simple().to_string();
        let (base, full_name) =
            object_name(category, file_name, Utc::now().timestamp_millis(), &suffix[..10]);
        let data: Bytes = data.into();
        debug!("[UPLOAD] Uploading {} ({} bytes)", full_name, data.len());

        let part = Part::bytes(data.to_vec())
            .file_name(full_name)
            .mime_str(content_type)?;
        let form = Form::new().part("image", part).text("name", base);

        let response = self
            .http_client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed = serde_json::from_str::<UploadResponse>(&text);
        if !status.is_success() {
            let reason = parsed
                .ok()
                .and_then(|r| r.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("image host returned {}", status));
            warn!("[UPLOAD] Upload failed: {}", reason);
            return Err(VeneredLinkError::UploadError(reason));
        }
        parsed?.into_url()
    }

    /// Read an image file and upload it.
    pub async fn upload_file(&self, path: &Path, category: ImageCategory) -> Result<String> {
        let content_type = content_type_for(path).ok_or_else(|| {
            VeneredLinkError::ValidationError(format!("{} is not an image", path.display()))
        })?;
        let data = tokio::fs::read(path).await.map_err(|e| {
            VeneredLinkError::ValidationError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.jpg");
        self.upload(data, file_name, content_type, category).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_name() {
        let (base, full) = object_name(ImageCategory::Messages, "cat.photo.PNG", 1700, "abc");
        assert_eq!(base, "messages_1700_abc");
        assert_eq!(full, "messages_1700_abc.PNG");

        let (_, full) = object_name(ImageCategory::Posts, "noext", 1, "x");
        assert_eq!(full, "posts_1_x.jpg");
    }

    #[test]
    fn test_response_url_selection() {
        let ok: UploadResponse =
            serde_json::from_str(r#"{"success":true,"data":{"url":"","display_url":"https://i/x"}}"#).unwrap();
        assert_eq!(ok.into_url().unwrap(), "https://i/x");

        let failed: UploadResponse =
            serde_json::from_str(r#"{"success":false,"error":{"message":"Invalid API v1 key."}}"#).unwrap();
        assert!(matches!(
            failed.into_url(),
            Err(VeneredLinkError::UploadError(m)) if m == "Invalid API v1 key."
        ));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a/b.JPG")), Some("image/jpeg"));
        assert_eq!(content_type_for(Path::new("notes.txt")), None);
    }

    #[tokio::test]
    async fn test_rejects_non_images_and_missing_key() {
        let uploader = ImageUploader::new(reqwest::Client::new(), None);
        assert!(matches!(
            uploader.upload(vec![1u8], "a.txt", "text/plain", ImageCategory::Posts).await,
            Err(VeneredLinkError::ValidationError(_))
        ));
        assert!(matches!(
            uploader.upload(vec![1u8], "a.png", "image/png", ImageCategory::Posts).await,
            Err(VeneredLinkError::ConfigurationError(_))
        ));
    }
}
