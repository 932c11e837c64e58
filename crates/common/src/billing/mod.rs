//! Payment provider integration
//!
//! - `events`: typed view of webhook payloads
//! - `signature`: webhook authenticity check
//! - `processor`: idempotent application of events to entitlement state
//! - `provider`: synchronous provider API (customers, checkout, portal)

pub mod events;
pub mod processor;
pub mod provider;
pub mod signature;

pub use events::{EventKind, ProviderEvent};
pub use processor::{PaymentEventProcessor, PlanPrices, ProcessOutcome};
pub use provider::{CheckoutRequest, PaymentProvider, StripeClient};
pub use signature::WebhookVerifier;
