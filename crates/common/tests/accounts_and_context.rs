//! Trial lifecycle, document selection and context building end to end

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, IntoActiveModel, Set};
use std::sync::Arc;
use writify_common::{
    context::{
        DocumentContextBuilder, GenerationParams, MockGenerationClient, SourceDocument,
        SuggestionKind, SuggestionPipeline, CONTINUES_MARKER,
    },
    db::{
        models::{FileType, SubscriptionStatus},
        schema::create_schema,
        Credential, DbPool, NewAccount, NewDocument, Repository,
    },
    entitlement::TRIAL_DAYS,
    errors::AppError,
};

async fn setup() -> (DbPool, Repository) {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1);
    let conn = Database::connect(opts).await.unwrap();
    create_schema(&conn).await.unwrap();
    let pool = DbPool::from_connection(conn);
    (pool.clone(), Repository::new(pool))
}

fn new_account(email: &str) -> NewAccount {
    NewAccount {
        email: email.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Writer".to_string(),
        credential: Credential::Password("$argon2id$test".to_string()),
    }
}

fn new_document(account_id: uuid::Uuid, name: &str, text: String) -> NewDocument {
    NewDocument {
        account_id,
        filename: format!("{}_{}", account_id.simple(), name),
        original_filename: name.to_string(),
        file_type: FileType::Pdf,
        file_size: text.len() as i64,
        content_text: text,
        local_path: None,
        remote_public_id: None,
        remote_url: None,
    }
}

#[tokio::test]
async fn signup_starts_seven_day_trial() {
    let (_pool, repo) = setup().await;
    let account = repo.create_account(new_account("ada@example.com")).await.unwrap();

    assert_eq!(account.status(), SubscriptionStatus::Trial);
    let ends = account.trial_ends_at.unwrap().with_timezone(&Utc);
    let expected = Utc::now() + Duration::days(TRIAL_DAYS);
    assert!((ends - expected).num_seconds().abs() < 60);
    assert!(account.has_valid_access_at(Utc::now()));

    let duplicate = repo.create_account(new_account("ada@example.com")).await;
    assert!(matches!(duplicate, Err(AppError::DuplicateAccount)));
}

#[tokio::test]
async fn trial_expiry_is_lazy() {
    let (pool, repo) = setup().await;
    let account = repo.create_account(new_account("ada@example.com")).await.unwrap();

    let mut active = account.into_active_model();
    active.trial_ends_at = Set(Some((Utc::now() - Duration::hours(1)).into()));
    let account = active.update(pool.conn()).await.unwrap();

    // Stored status is untouched until the sweep runs
    let stored = repo.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), SubscriptionStatus::Trial);
    assert!(!stored.has_valid_access_at(Utc::now()));

    let swept = repo.expire_trial_if_due(stored).await.unwrap();
    assert_eq!(swept.status(), SubscriptionStatus::TrialExpired);
    let stored = repo.find_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), SubscriptionStatus::TrialExpired);

    // A second sweep is a no-op
    let again = repo.expire_trial_if_due(stored.clone()).await.unwrap();
    assert_eq!(again, stored);
}

#[tokio::test]
async fn federated_accounts_link_by_email() {
    let (_pool, repo) = setup().await;
    let account = repo.create_account(new_account("ada@example.com")).await.unwrap();

    let linked = repo.link_federated_id(account, "google-sub-1").await.unwrap();
    let found = repo
        .find_account_by_federated_id("google-sub-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, linked.id);
    assert!(found.password_hash.is_some());
}

#[tokio::test]
async fn context_selection_prefers_explicit_then_text_then_all() {
    let (_pool, repo) = setup().await;
    let ada = repo.create_account(new_account("ada@example.com")).await.unwrap();
    let bob = repo.create_account(new_account("bob@example.com")).await.unwrap();

    let notes = repo
        .create_document(new_document(ada.id, "notes.pdf", "Notes.".to_string()))
        .await
        .unwrap();
    let outline = repo
        .create_document(new_document(ada.id, "outline.pdf", "Outline.".to_string()))
        .await
        .unwrap();
    let foreign = repo
        .create_document(new_document(bob.id, "bob.pdf", "Bob.".to_string()))
        .await
        .unwrap();

    let text = repo
        .create_text(ada.id, "Essay".to_string(), String::new(), &[outline.id])
        .await
        .unwrap();

    let explicit = repo
        .select_context_documents(ada.id, Some(text.id), Some(&[notes.id, foreign.id][..]))
        .await
        .unwrap();
    assert_eq!(explicit.iter().map(|d| d.id).collect::<Vec<_>>(), vec![notes.id]);

    let by_text = repo
        .select_context_documents(ada.id, Some(text.id), None)
        .await
        .unwrap();
    assert_eq!(by_text.iter().map(|d| d.id).collect::<Vec<_>>(), vec![outline.id]);

    let all = repo.select_context_documents(ada.id, None, Some(&[][..])).await.unwrap();
    assert_eq!(all.len(), 2);

    // Foreign documents cannot be attached to a text
    let rejected = repo
        .update_text(ada.id, text.id, "Essay".to_string(), String::new(), Some(&[foreign.id][..]))
        .await;
    assert!(rejected.is_err());
    assert_eq!(repo.text_document_ids(text.id).await.unwrap(), vec![outline.id]);
}

#[tokio::test]
async fn two_long_documents_fit_the_budget() {
    let (_pool, repo) = setup().await;
    let ada = repo.create_account(new_account("ada@example.com")).await.unwrap();

    let body = "The quick brown fox jumps over the lazy dog. ".repeat(230);
    let long: String = body.chars().take(10_000).collect();
    for name in ["first.pdf", "second.pdf"] {
        repo.create_document(new_document(ada.id, name, long.clone()))
            .await
            .unwrap();
    }

    let documents = repo.select_context_documents(ada.id, None, None).await.unwrap();
    let sources: Vec<SourceDocument<'_>> = documents.iter().map(SourceDocument::from).collect();
    let context = DocumentContextBuilder::default().build(&sources, 5000);

    assert!(context.chars().count() <= 5000);
    assert!(context.contains("--- From first.pdf ---"));
    assert!(context.contains("--- From second.pdf ---"));
    assert_eq!(context.matches(CONTINUES_MARKER.trim()).count(), 2);
}

#[tokio::test]
async fn deleting_an_account_cascades() {
    let (_pool, repo) = setup().await;
    let ada = repo.create_account(new_account("ada@example.com")).await.unwrap();
    let doc = repo
        .create_document(new_document(ada.id, "notes.pdf", "Notes.".to_string()))
        .await
        .unwrap();
    repo.create_text(ada.id, "Essay".to_string(), "Draft".to_string(), &[doc.id])
        .await
        .unwrap();

    let removed = repo.delete_account(ada.id).await.unwrap();
    assert_eq!(removed.len(), 1);
    assert!(repo.find_account(ada.id).await.unwrap().is_none());
    assert!(repo.list_texts(ada.id).await.unwrap().is_empty());
    assert!(repo.list_documents(ada.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn pipeline_folds_failures_into_suggestions() {
    let params = GenerationParams {
        max_tokens: 100,
        temperature: 0.7,
    };

    let failing = SuggestionPipeline::new(
        Arc::new(MockGenerationClient::failing("upstream timeout")),
        params,
        8000,
    );
    let suggestions = failing.suggest("Essay", "Draft", "").await;
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].kind, SuggestionKind::Error);

    let rambling = SuggestionPipeline::new(
        Arc::new(MockGenerationClient::with_reply("Sure! Here are some thoughts.")),
        params,
        8000,
    );
    let suggestions = rambling.suggest("Essay", "Draft", "").await;
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].kind, SuggestionKind::General);
}
