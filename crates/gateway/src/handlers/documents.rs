//! Document upload, listing and removal

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::middleware::CurrentAccount;
use crate::AppState;
use writify_common::{
    db::{models::{Document, FileType}, NewDocument},
    documents::{extract_text, stored_filename},
    errors::{AppError, Result},
    metrics,
};

/// Room for multipart boundaries and part headers on top of the file itself
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub url: Option<String>,
    pub text_length: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Document> for DocumentView {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            filename: doc.original_filename.clone(),
            file_type: doc.file_type.clone(),
            file_size: doc.file_size,
            url: doc.remote_url.clone(),
            text_length: doc.content_text.as_deref().map_or(0, |t| t.chars().count()),
            created_at: doc.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub document: DocumentView,
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentView>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

fn multipart_error(error: MultipartError, declared_len: Option<usize>, limit: usize) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge {
            size: declared_len.unwrap_or(limit),
            limit,
        };
    }
    AppError::InvalidFormat {
        message: error.body_text(),
    }
}

/// Accept a PDF or DOCX upload, extract its text and store it
pub async fn upload_document(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let limit = state.config.documents.max_upload_bytes;
    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, declared_len, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, declared_len, limit))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| AppError::MissingField {
        field: "file".to_string(),
    })?;
    if filename.is_empty() {
        return Err(AppError::Validation {
            message: "No file selected".to_string(),
            field: Some("file".to_string()),
        });
    }

    let file_type = FileType::from_filename(&filename).ok_or_else(|| {
        AppError::UnsupportedFileType {
            extension: filename
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_lowercase())
                .unwrap_or_default(),
        }
    })?;

    if bytes.len() > limit {
        return Err(AppError::PayloadTooLarge {
            size: bytes.len(),
            limit,
        });
    }

    let data = bytes.clone();
    let text = tokio::task::spawn_blocking(move || extract_text(file_type, &data))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Extraction task failed: {}", e),
        })?;
    if text.is_empty() {
        tracing::info!(account_id = %account.id, filename = %filename, "No text extracted from upload");
        return Err(AppError::Validation {
            message: "Could not extract text from file".to_string(),
            field: Some("file".to_string()),
        });
    }

    let stored_name = stored_filename(account.id, &filename);
    let file_size = bytes.len() as i64;
    let stored = state.storage.store(&stored_name, bytes.to_vec()).await?;

    let new = NewDocument {
        account_id: account.id,
        filename: stored.filename.clone(),
        original_filename: filename,
        file_type,
        file_size,
        content_text: text,
        local_path: stored.local_path.clone(),
        remote_public_id: stored.remote.as_ref().map(|r| r.public_id.clone()),
        remote_url: stored.remote.as_ref().map(|r| r.url.clone()),
    };

    let document = match state.repo.create_document(new).await {
        Ok(document) => document,
        Err(e) => {
            state.storage.discard(&stored).await;
            return Err(e);
        }
    };

    metrics::record_upload(file_type.as_str(), stored.backend());
    tracing::info!(
        account_id = %account.id,
        document_id = %document.id,
        file_type = file_type.as_str(),
        backend = stored.backend(),
        "Document uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            document: DocumentView::from(&document),
        }),
    ))
}

/// List the account's documents
pub async fn list_documents(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<DocumentListResponse>> {
    let documents = state.repo.list_documents(account.id).await?;
    Ok(Json(DocumentListResponse {
        documents: documents.iter().map(DocumentView::from).collect(),
    }))
}

/// Delete one of the account's documents and its stored file
pub async fn delete_document(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>> {
    let document = state.repo.delete_document(account.id, id).await?;
    state.storage.remove(&document).await;

    tracing::info!(account_id = %account.id, document_id = %id, "Document deleted");
    Ok(Json(DeleteResponse { success: true }))
}
