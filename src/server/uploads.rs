//! Tour image uploads
//!
//! Tour updates accept either a JSON body or a multipart form carrying
//! `imageCover` (one file) and `images` (up to three files) next to regular
//! fields. Images are handed to an [`ImageStore`]; resizing and re-encoding
//! are the store's concern.

use crate::core::error::{ApiError, ApiResult};
use crate::core::extractors::ApiJson;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use chrono::Utc;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

pub const COVER_FIELD: &str = "imageCover";
pub const GALLERY_FIELD: &str = "images";
pub const MAX_GALLERY_IMAGES: usize = 3;

/// Target dimensions for stored tour images
pub const TOUR_IMAGE_SIZE: (u32, u32) = (2000, 1333);

/// Destination for uploaded images
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `image` under `filename`
    async fn save(&self, filename: &str, image: Bytes) -> ApiResult<()>;
}

/// Writes images into a directory
#[derive(Debug, Clone)]
pub struct DiskImageStore {
    dir: PathBuf,
}

impl DiskImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn save(&self, filename: &str, image: Bytes) -> ApiResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to create image directory: {}", e)))?;
        let path = self.dir.join(filename);
        tokio::fs::write(&path, &image)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to write {}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), bytes = image.len(), "image stored");
        Ok(())
    }
}

/// One uploaded file
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub content_type: String,
    pub bytes: Bytes,
}

/// Parsed multipart form
#[derive(Debug, Clone, Default)]
pub struct TourForm {
    pub fields: Map<String, Value>,
    pub cover: Option<UploadedFile>,
    pub gallery: Vec<UploadedFile>,
}

/// Body of a tour update
#[derive(Debug, Clone)]
pub enum TourUpdateBody {
    Json(Value),
    Form(TourForm),
}

impl<S> FromRequest<S> for TourUpdateBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if !is_multipart {
            let ApiJson(value) = ApiJson::<Value>::from_request(req, state).await?;
            return Ok(TourUpdateBody::Json(value));
        }

        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest {
                message: rejection.body_text(),
            })?;
        Ok(TourUpdateBody::Form(read_form(multipart).await?))
    }
}

fn multipart_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest {
        message: format!("Invalid multipart body: {}", e),
    }
}

async fn read_form(mut multipart: Multipart) -> ApiResult<TourForm> {
    let mut form = TourForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_none() {
            let text = field.text().await.map_err(multipart_error)?;
            let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
            form.fields.insert(name, value);
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image") {
            return Err(ApiError::BadRequest {
                message: "Not an image! Please upload only images.".to_string(),
            });
        }
        let file = UploadedFile {
            content_type,
            bytes: field.bytes().await.map_err(multipart_error)?,
        };

        match name.as_str() {
            COVER_FIELD if form.cover.is_none() => form.cover = Some(file),
            GALLERY_FIELD if form.gallery.len() < MAX_GALLERY_IMAGES => form.gallery.push(file),
            _ => {
                return Err(ApiError::BadRequest {
                    message: format!("Unexpected field: {}", name),
                });
            }
        }
    }

    Ok(form)
}

/// Store the uploaded images of tour `tour_id` and return the update fields.
///
/// Images are processed only when both the cover and the gallery were sent.
pub async fn process_tour_images(
    images: &Arc<dyn ImageStore>,
    tour_id: &str,
    form: TourForm,
) -> ApiResult<Map<String, Value>> {
    let mut fields = form.fields;
    let (Some(cover), false) = (form.cover, form.gallery.is_empty()) else {
        return Ok(fields);
    };

    let stamp = Utc::now().timestamp_millis();

    let cover_name = format!("tour-{}-{}-cover.jpeg", tour_id, stamp);
    images.save(&cover_name, cover.bytes).await?;

    let gallery_names: Vec<String> = (1..=form.gallery.len())
        .map(|n| format!("tour-{}-{}-{}.jpeg", tour_id, stamp, n))
        .collect();
    try_join_all(
        form.gallery
            .into_iter()
            .zip(&gallery_names)
            .map(|(file, name)| images.save(name, file.bytes)),
    )
    .await?;

    fields.insert(COVER_FIELD.to_string(), Value::String(cover_name));
    fields.insert(
        GALLERY_FIELD.to_string(),
        Value::Array(gallery_names.into_iter().map(Value::String).collect()),
    );
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageStore for RecordingStore {
        async fn save(&self, filename: &str, _image: Bytes) -> ApiResult<()> {
            self.saved.lock().unwrap().push(filename.to_string());
            Ok(())
        }
    }

    fn image() -> UploadedFile {
        UploadedFile {
            content_type: "image/jpeg".into(),
            bytes: Bytes::from_static(b"\xff\xd8\xff"),
        }
    }

    #[tokio::test]
    async fn test_process_names_cover_and_gallery() {
        let recording = Arc::new(RecordingStore::default());
        let store: Arc<dyn ImageStore> = recording.clone();
        let mut form = TourForm {
            cover: Some(image()),
            gallery: vec![image(), image()],
            ..TourForm::default()
        };
        form.fields.insert("price".into(), Value::from(500));

        let fields = process_tour_images(&store, "abc", form).await.unwrap();

        let cover = fields[COVER_FIELD].as_str().unwrap();
        assert!(cover.starts_with("tour-abc-") && cover.ends_with("-cover.jpeg"));
        let gallery = fields[GALLERY_FIELD].as_array().unwrap();
        assert_eq!(gallery.len(), 2);
        assert!(gallery[1].as_str().unwrap().ends_with("-2.jpeg"));
        assert_eq!(fields["price"], 500);
        assert_eq!(recording.saved.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_process_skips_when_gallery_missing() {
        let recording = Arc::new(RecordingStore::default());
        let store: Arc<dyn ImageStore> = recording.clone();
        let form = TourForm {
            cover: Some(image()),
            ..TourForm::default()
        };

        let fields = process_tour_images(&store, "abc", form).await.unwrap();
        assert!(fields.is_empty());
        assert!(recording.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disk_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(dir.path().join("tours"));
        store
            .save("tour-1-cover.jpeg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        let written = std::fs::read(dir.path().join("tours/tour-1-cover.jpeg")).unwrap();
        assert_eq!(written, b"jpeg");
    }
}
