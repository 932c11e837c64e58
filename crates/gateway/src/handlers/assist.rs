//! AI writing suggestions

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::CurrentAccount;
use crate::AppState;
use writify_common::{
    context::{SourceDocument, Suggestion},
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct AssistRequest {
    #[serde(default)]
    pub title: String,

    #[serde(default, alias = "text")]
    pub current_text: String,

    #[serde(default)]
    pub text_id: Option<Uuid>,

    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
}

#[derive(Serialize)]
pub struct AssistResponse {
    pub success: bool,
    pub suggestions: Vec<Suggestion>,
}

/// Suggest how to continue, improve or restructure the current text.
///
/// Generation failures come back as an error-typed suggestion, not an
/// error status.
pub async fn ai_assist(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(request): Json<AssistRequest>,
) -> Result<Json<AssistResponse>> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation {
            message: "Title is required".to_string(),
            field: Some("title".to_string()),
        });
    }

    let documents = state
        .repo
        .select_context_documents(account.id, request.text_id, request.document_ids.as_deref())
        .await?;
    let sources: Vec<SourceDocument<'_>> = documents.iter().map(SourceDocument::from).collect();
    let context = state
        .context_builder
        .build(&sources, state.config.context.max_chars);

    tracing::debug!(
        account_id = %account.id,
        documents = documents.len(),
        context_chars = context.chars().count(),
        "Requesting suggestions"
    );

    let suggestions = state
        .suggestions
        .suggest(title, request.current_text.trim(), &context)
        .await;

    Ok(Json(AssistResponse {
        success: true,
        suggestions,
    }))
}
