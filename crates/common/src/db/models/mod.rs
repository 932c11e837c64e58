//! SeaORM entity models
//!
//! Database entities for Writify

pub(crate) mod account;
pub(crate) mod document;
pub(crate) mod payment_event;
pub(crate) mod subscription;
pub(crate) mod text;
pub(crate) mod text_document;

pub use account::{
    Entity as AccountEntity,
    Model as Account,
    ActiveModel as AccountActiveModel,
    Column as AccountColumn,
    SubscriptionPlan,
    SubscriptionStatus,
};

pub use subscription::{
    Entity as SubscriptionEntity,
    Model as Subscription,
    ActiveModel as SubscriptionActiveModel,
    Column as SubscriptionColumn,
    STATUS_ACTIVE as SUBSCRIPTION_STATUS_ACTIVE,
};

pub use payment_event::{
    Entity as PaymentEventEntity,
    Model as PaymentEvent,
    ActiveModel as PaymentEventActiveModel,
    Column as PaymentEventColumn,
};

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
    FileType,
};

pub use text::{
    Entity as TextEntity,
    Model as Text,
    ActiveModel as TextActiveModel,
    Column as TextColumn,
};

pub use text_document::{
    Entity as TextDocumentEntity,
    Model as TextDocument,
    ActiveModel as TextDocumentActiveModel,
    Column as TextDocumentColumn,
};
