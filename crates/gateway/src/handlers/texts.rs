//! Saved texts and their document associations

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::middleware::CurrentAccount;
use crate::AppState;
use writify_common::{
    db::models::Text,
    errors::{AppError, Result},
};

use super::documents::DeleteResponse;

#[derive(Debug, Deserialize, Validate)]
pub struct TextRequest {
    #[validate(length(max = 200))]
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub content: String,

    /// Replaces the association set when present
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
}

impl TextRequest {
    /// Validated, trimmed title
    fn title(&self) -> Result<String> {
        self.validate()?;
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation {
                message: "Title is required".to_string(),
                field: Some("title".to_string()),
            });
        }
        Ok(title.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct TextView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub document_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TextView {
    fn new(text: Text, document_ids: Vec<Uuid>) -> Self {
        Self {
            id: text.id,
            title: text.title,
            content: text.content,
            document_ids,
            created_at: text.created_at.with_timezone(&Utc),
            updated_at: text.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Serialize)]
pub struct TextListResponse {
    pub texts: Vec<TextView>,
}

async fn view(state: &AppState, text: Text) -> Result<TextView> {
    let document_ids = state.repo.text_document_ids(text.id).await?;
    Ok(TextView::new(text, document_ids))
}

pub async fn list_texts(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<TextListResponse>> {
    let texts = state.repo.list_texts(account.id).await?;

    let mut views = Vec::with_capacity(texts.len());
    for text in texts {
        views.push(view(&state, text).await?);
    }
    Ok(Json(TextListResponse { texts: views }))
}

pub async fn get_text(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(id): Path<Uuid>,
) -> Result<Json<TextView>> {
    let text = state
        .repo
        .find_text(account.id, id)
        .await?
        .ok_or_else(|| AppError::TextNotFound { id: id.to_string() })?;
    Ok(Json(view(&state, text).await?))
}

pub async fn create_text(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(request): Json<TextRequest>,
) -> Result<(StatusCode, Json<TextView>)> {
    let title = request.title()?;
    let document_ids = request.document_ids.unwrap_or_default();

    let text = state
        .repo
        .create_text(account.id, title, request.content, &document_ids)
        .await?;

    tracing::info!(account_id = %account.id, text_id = %text.id, "Text created");
    Ok((StatusCode::CREATED, Json(view(&state, text).await?)))
}

pub async fn update_text(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(id): Path<Uuid>,
    Json(request): Json<TextRequest>,
) -> Result<Json<TextView>> {
    let title = request.title()?;

    let text = state
        .repo
        .update_text(
            account.id,
            id,
            title,
            request.content,
            request.document_ids.as_deref(),
        )
        .await?;

    Ok(Json(view(&state, text).await?))
}

pub async fn delete_text(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>> {
    state.repo.delete_text(account.id, id).await?;
    tracing::info!(account_id = %account.id, text_id = %id, "Text deleted");
    Ok(Json(DeleteResponse { success: true }))
}
