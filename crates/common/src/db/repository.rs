//! Repository pattern for database operations
//!
//! Account, document and text access for the gateway. Webhook-driven
//! entitlement writes live in `billing::processor` because they run inside
//! the processor's own transaction.

use crate::db::models::*;
use crate::db::DbPool;
use crate::entitlement;
use crate::errors::{AppError, Result};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::collections::BTreeSet;
use uuid::Uuid;

/// How a new account proves its identity
#[derive(Debug, Clone)]
pub enum Credential {
    /// Argon2 password hash
    Password(String),
    /// Federated identity subject id
    Federated(String),
}

/// Input for account creation
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub credential: Credential,
}

/// Input for document creation after a successful upload
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub account_id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_type: FileType,
    pub file_size: i64,
    pub content_text: String,
    pub local_path: Option<String>,
    pub remote_public_id: Option<String>,
    pub remote_url: Option<String>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Account Operations
    // ========================================================================

    /// Find account by ID
    pub async fn find_account(&self, id: Uuid) -> Result<Option<Account>> {
        AccountEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find account by (already normalized) email
    pub async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        AccountEntity::find()
            .filter(AccountColumn::Email.eq(email))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find account by federated identity subject
    pub async fn find_account_by_federated_id(&self, federated_id: &str) -> Result<Option<Account>> {
        AccountEntity::find()
            .filter(AccountColumn::FederatedId.eq(federated_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Create an account and start its trial
    pub async fn create_account(&self, new: NewAccount) -> Result<Account> {
        if self.find_account_by_email(&new.email).await?.is_some() {
            return Err(AppError::DuplicateAccount);
        }

        let now = Utc::now();
        let (password_hash, federated_id) = match new.credential {
            Credential::Password(hash) => (Some(hash), None),
            Credential::Federated(id) => (None, Some(id)),
        };

        let mut account = AccountActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(new.email),
            password_hash: Set(password_hash),
            federated_id: Set(federated_id),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            subscription_status: Set(SubscriptionStatus::Incomplete.into()),
            subscription_plan: Set(SubscriptionPlan::None.into()),
            customer_ref: Set(None),
            trial_ends_at: Set(None),
            subscription_ends_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        entitlement::start_trial(&mut account, now);

        let account = account.insert(self.conn()).await?;
        tracing::info!(account_id = %account.id, "Account created with trial");
        Ok(account)
    }

    /// Persist trial expiry for an account whose trial has lapsed
    pub async fn expire_trial_if_due(&self, account: Account) -> Result<Account> {
        entitlement::expire_trial_if_due(self.conn(), account, Utc::now()).await
    }

    /// Attach a federated identity to an existing password account
    pub async fn link_federated_id(&self, account: Account, federated_id: &str) -> Result<Account> {
        let mut active = account.into_active_model();
        active.federated_id = Set(Some(federated_id.to_string()));
        active.updated_at = Set(Utc::now().into());
        active.update(self.conn()).await.map_err(Into::into)
    }

    /// Store the payment provider customer reference
    pub async fn set_customer_ref(&self, account: Account, customer_ref: &str) -> Result<Account> {
        let mut active = account.into_active_model();
        active.customer_ref = Set(Some(customer_ref.to_string()));
        active.updated_at = Set(Utc::now().into());
        active.update(self.conn()).await.map_err(Into::into)
    }

    /// Remove an account and everything it owns.
    ///
    /// Payment events are kept as audit history with the account reference
    /// cleared. Returns the deleted documents so stored files can be removed.
    pub async fn delete_account(&self, account_id: Uuid) -> Result<Vec<Document>> {
        let txn = self.conn().begin().await?;

        let documents = DocumentEntity::find()
            .filter(DocumentColumn::AccountId.eq(account_id))
            .all(&txn)
            .await?;
        let document_ids: Vec<Uuid> = documents.iter().map(|d| d.id).collect();

        let text_ids: Vec<Uuid> = TextEntity::find()
            .filter(TextColumn::AccountId.eq(account_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();

        TextDocumentEntity::delete_many()
            .filter(
                TextDocumentColumn::TextId
                    .is_in(text_ids)
                    .or(TextDocumentColumn::DocumentId.is_in(document_ids)),
            )
            .exec(&txn)
            .await?;
        TextEntity::delete_many()
            .filter(TextColumn::AccountId.eq(account_id))
            .exec(&txn)
            .await?;
        DocumentEntity::delete_many()
            .filter(DocumentColumn::AccountId.eq(account_id))
            .exec(&txn)
            .await?;
        SubscriptionEntity::delete_many()
            .filter(SubscriptionColumn::AccountId.eq(account_id))
            .exec(&txn)
            .await?;
        PaymentEventEntity::update_many()
            .col_expr(PaymentEventColumn::AccountId, Expr::value(Option::<Uuid>::None))
            .filter(PaymentEventColumn::AccountId.eq(account_id))
            .exec(&txn)
            .await?;
        AccountEntity::delete_by_id(account_id).exec(&txn).await?;

        txn.commit().await?;

        tracing::info!(account_id = %account_id, documents = documents.len(), "Account removed");
        Ok(documents)
    }

    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Find the account's active subscription record
    pub async fn find_active_subscription(&self, account_id: Uuid) -> Result<Option<Subscription>> {
        SubscriptionEntity::find()
            .filter(SubscriptionColumn::AccountId.eq(account_id))
            .filter(SubscriptionColumn::Status.eq(SUBSCRIPTION_STATUS_ACTIVE))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Subscription history, newest first
    pub async fn list_subscriptions(&self, account_id: Uuid) -> Result<Vec<Subscription>> {
        SubscriptionEntity::find()
            .filter(SubscriptionColumn::AccountId.eq(account_id))
            .order_by_desc(SubscriptionColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Create a document record
    pub async fn create_document(&self, new: NewDocument) -> Result<Document> {
        let document = DocumentActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(new.account_id),
            filename: Set(new.filename),
            original_filename: Set(new.original_filename),
            file_type: Set(new.file_type.as_str().to_string()),
            file_size: Set(new.file_size),
            content_text: Set(Some(new.content_text)),
            local_path: Set(new.local_path),
            remote_public_id: Set(new.remote_public_id),
            remote_url: Set(new.remote_url),
            created_at: Set(Utc::now().into()),
        };

        document.insert(self.conn()).await.map_err(Into::into)
    }

    /// List the account's documents, newest first
    pub async fn list_documents(&self, account_id: Uuid) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::AccountId.eq(account_id))
            .order_by_desc(DocumentColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find a document owned by the account
    pub async fn find_document(&self, account_id: Uuid, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .filter(DocumentColumn::AccountId.eq(account_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Delete a document owned by the account, with its text associations
    pub async fn delete_document(&self, account_id: Uuid, id: Uuid) -> Result<Document> {
        let document = self
            .find_document(account_id, id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;

        let txn = self.conn().begin().await?;
        TextDocumentEntity::delete_many()
            .filter(TextDocumentColumn::DocumentId.eq(id))
            .exec(&txn)
            .await?;
        DocumentEntity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        Ok(document)
    }

    /// Documents to build suggestion context from.
    ///
    /// Explicit ids win; otherwise the text's associated documents; otherwise
    /// every document the account owns.
    pub async fn select_context_documents(
        &self,
        account_id: Uuid,
        text_id: Option<Uuid>,
        document_ids: Option<&[Uuid]>,
    ) -> Result<Vec<Document>> {
        if let Some(ids) = document_ids.filter(|ids| !ids.is_empty()) {
            return DocumentEntity::find()
                .filter(DocumentColumn::AccountId.eq(account_id))
                .filter(DocumentColumn::Id.is_in(ids.to_vec()))
                .order_by_asc(DocumentColumn::CreatedAt)
                .all(self.conn())
                .await
                .map_err(Into::into);
        }

        if let Some(text_id) = text_id {
            let linked = self.documents_for_text(account_id, text_id).await?;
            if !linked.is_empty() {
                return Ok(linked);
            }
        }

        DocumentEntity::find()
            .filter(DocumentColumn::AccountId.eq(account_id))
            .order_by_asc(DocumentColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Documents associated with one of the account's texts
    pub async fn documents_for_text(&self, account_id: Uuid, text_id: Uuid) -> Result<Vec<Document>> {
        let document_ids: Vec<Uuid> = TextDocumentEntity::find()
            .filter(TextDocumentColumn::TextId.eq(text_id))
            .all(self.conn())
            .await?
            .into_iter()
            .map(|link| link.document_id)
            .collect();

        if document_ids.is_empty() {
            return Ok(Vec::new());
        }

        DocumentEntity::find()
            .filter(DocumentColumn::AccountId.eq(account_id))
            .filter(DocumentColumn::Id.is_in(document_ids))
            .order_by_asc(DocumentColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Text Operations
    // ========================================================================

    /// List the account's texts, most recently edited first
    pub async fn list_texts(&self, account_id: Uuid) -> Result<Vec<Text>> {
        TextEntity::find()
            .filter(TextColumn::AccountId.eq(account_id))
            .order_by_desc(TextColumn::UpdatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find a text owned by the account
    pub async fn find_text(&self, account_id: Uuid, id: Uuid) -> Result<Option<Text>> {
        TextEntity::find_by_id(id)
            .filter(TextColumn::AccountId.eq(account_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Create a text and its document associations
    pub async fn create_text(
        &self,
        account_id: Uuid,
        title: String,
        content: String,
        document_ids: &[Uuid],
    ) -> Result<Text> {
        let now = Utc::now();
        let txn = self.conn().begin().await?;

        let text = TextActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account_id),
            title: Set(title),
            content: Set(content),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;

        replace_text_documents(&txn, account_id, text.id, document_ids).await?;
        txn.commit().await?;

        Ok(text)
    }

    /// Update a text; `document_ids` of `None` leaves associations untouched
    pub async fn update_text(
        &self,
        account_id: Uuid,
        id: Uuid,
        title: String,
        content: String,
        document_ids: Option<&[Uuid]>,
    ) -> Result<Text> {
        let text = self
            .find_text(account_id, id)
            .await?
            .ok_or_else(|| AppError::TextNotFound { id: id.to_string() })?;

        let txn = self.conn().begin().await?;

        let mut active = text.into_active_model();
        active.title = Set(title);
        active.content = Set(content);
        active.updated_at = Set(Utc::now().into());
        let text = active.update(&txn).await?;

        if let Some(document_ids) = document_ids {
            replace_text_documents(&txn, account_id, id, document_ids).await?;
        }
        txn.commit().await?;

        Ok(text)
    }

    /// Delete a text owned by the account
    pub async fn delete_text(&self, account_id: Uuid, id: Uuid) -> Result<()> {
        if self.find_text(account_id, id).await?.is_none() {
            return Err(AppError::TextNotFound { id: id.to_string() });
        }

        let txn = self.conn().begin().await?;
        TextDocumentEntity::delete_many()
            .filter(TextDocumentColumn::TextId.eq(id))
            .exec(&txn)
            .await?;
        TextEntity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        Ok(())
    }

    /// Ids of the documents associated with a text
    pub async fn text_document_ids(&self, text_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(TextDocumentEntity::find()
            .filter(TextDocumentColumn::TextId.eq(text_id))
            .all(self.conn())
            .await?
            .into_iter()
            .map(|link| link.document_id)
            .collect())
    }
}

/// Replace a text's association set, rejecting documents the account does not own
async fn replace_text_documents<C: ConnectionTrait>(
    conn: &C,
    account_id: Uuid,
    text_id: Uuid,
    document_ids: &[Uuid],
) -> Result<()> {
    let unique: BTreeSet<Uuid> = document_ids.iter().copied().collect();

    if !unique.is_empty() {
        let owned = DocumentEntity::find()
            .filter(DocumentColumn::AccountId.eq(account_id))
            .filter(DocumentColumn::Id.is_in(unique.iter().copied()))
            .count(conn)
            .await?;
        if owned as usize != unique.len() {
            return Err(AppError::Validation {
                message: "Unknown document in document_ids".to_string(),
                field: Some("document_ids".to_string()),
            });
        }
    }

    TextDocumentEntity::delete_many()
        .filter(TextDocumentColumn::TextId.eq(text_id))
        .exec(conn)
        .await?;

    if unique.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let links = unique.into_iter().map(|document_id| TextDocumentActiveModel {
        text_id: Set(text_id),
        document_id: Set(document_id),
        created_at: Set(now.into()),
    });
    TextDocumentEntity::insert_many(links)
        .exec_without_returning(conn)
        .await?;

    Ok(())
}
