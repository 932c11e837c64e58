//! Entitlement state model
//!
//! Answers "does this account currently have usable access?" from the
//! stored status and timestamps. Every predicate takes `now` explicitly so
//! callers (and tests) control the clock.
//!
//! Trial expiry is lazy: an account whose trial has lapsed keeps status
//! `trial` until the next authenticated request runs [`expire_trial_if_due`].

use crate::db::models::{
    Account, AccountActiveModel, AccountColumn, AccountEntity, SubscriptionPlan,
    SubscriptionStatus,
};
use crate::errors::{AppError, Result, PRICING_PATH};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde::Serialize;

/// Length of the free trial granted at signup
pub const TRIAL_DAYS: i64 = 7;

/// Put a freshly created account on the free trial
pub fn start_trial(account: &mut AccountActiveModel, now: DateTime<Utc>) {
    account.subscription_status = Set(SubscriptionStatus::Trial.into());
    account.trial_ends_at = Set(Some((now + Duration::days(TRIAL_DAYS)).into()));
}

impl Account {
    /// Trial status with an end date still in the future
    pub fn is_trial_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status() == SubscriptionStatus::Trial
            && self.trial_ends_at
                .is_some_and(|ends| ends.with_timezone(&Utc) > now)
    }

    pub fn is_subscription_active(&self) -> bool {
        self.status() == SubscriptionStatus::Active
    }

    /// The single predicate every gate depends on
    pub fn has_valid_access_at(&self, now: DateTime<Utc>) -> bool {
        self.is_trial_active_at(now) || self.is_subscription_active()
    }

    /// Whole days remaining in an active trial, 0 otherwise
    pub fn days_left_in_trial_at(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_trial_active_at(now) {
            return 0;
        }
        self.trial_ends_at
            .map(|ends| (ends.with_timezone(&Utc) - now).num_days().max(0))
            .unwrap_or(0)
    }

    /// Still marked `trial` although the trial window has closed
    pub fn is_trial_expiry_due(&self, now: DateTime<Utc>) -> bool {
        self.status() == SubscriptionStatus::Trial
            && self.trial_ends_at
                .is_some_and(|ends| ends.with_timezone(&Utc) <= now)
    }

    /// Error returned by the gate for API callers without access
    pub fn subscription_required(&self, now: DateTime<Utc>) -> AppError {
        let status = self.status();
        AppError::SubscriptionRequired {
            subscription_status: status.as_str().to_string(),
            trial_expired: status == SubscriptionStatus::TrialExpired
                || self.is_trial_expiry_due(now),
        }
    }
}

/// Why a page request was sent to the pricing page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateNotice {
    TrialExpired,
    SubscriptionInactive,
}

impl GateNotice {
    pub fn for_account(account: &Account) -> Self {
        match account.status() {
            SubscriptionStatus::Trial | SubscriptionStatus::TrialExpired => GateNotice::TrialExpired,
            _ => GateNotice::SubscriptionInactive,
        }
    }

    /// Query-string token carried by the redirect
    pub fn code(&self) -> &'static str {
        match self {
            GateNotice::TrialExpired => "trial_expired",
            GateNotice::SubscriptionInactive => "subscription_inactive",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "trial_expired" => Some(GateNotice::TrialExpired),
            "subscription_inactive" => Some(GateNotice::SubscriptionInactive),
            _ => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            GateNotice::TrialExpired => "Your free trial has expired. Please choose a plan to continue.",
            GateNotice::SubscriptionInactive => {
                "Your subscription is inactive. Please update your payment method or choose a new plan."
            }
        }
    }

    /// Redirect target for a refused page request
    pub fn redirect_path(&self) -> String {
        format!("{}?notice={}", PRICING_PATH, self.code())
    }
}

/// Persist `trial -> trial_expired` when the trial has lapsed.
///
/// The update is conditional on the row still being in `trial`, so a webhook
/// that activated the account concurrently is never overwritten. Returns the
/// account as it now stands.
pub async fn expire_trial_if_due<C: ConnectionTrait>(
    conn: &C,
    account: Account,
    now: DateTime<Utc>,
) -> Result<Account> {
    if !account.is_trial_expiry_due(now) {
        return Ok(account);
    }

    let result = AccountEntity::update_many()
        .col_expr(
            AccountColumn::SubscriptionStatus,
            Expr::value(SubscriptionStatus::TrialExpired.as_str()),
        )
        .col_expr(
            AccountColumn::UpdatedAt,
            Expr::value(now.fixed_offset()),
        )
        .filter(AccountColumn::Id.eq(account.id))
        .filter(AccountColumn::SubscriptionStatus.eq(SubscriptionStatus::Trial.as_str()))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        // Someone else moved the account on; report what is stored now.
        return AccountEntity::find_by_id(account.id)
            .one(conn)
            .await?
            .ok_or_else(|| AppError::AccountNotFound {
                id: account.id.to_string(),
            });
    }

    tracing::info!(account_id = %account.id, "Trial expired");
    crate::metrics::record_trial_expired();

    Ok(Account {
        subscription_status: SubscriptionStatus::TrialExpired.into(),
        updated_at: now.fixed_offset(),
        ..account
    })
}

/// Serializable view of an account's entitlement
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementSnapshot {
    pub subscription_status: SubscriptionStatus,
    pub subscription_plan: SubscriptionPlan,
    pub is_trial_active: bool,
    pub is_subscription_active: bool,
    pub has_valid_access: bool,
    pub days_left_in_trial: i64,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
}

impl EntitlementSnapshot {
    pub fn of(account: &Account, now: DateTime<Utc>) -> Self {
        Self {
            subscription_status: account.status(),
            subscription_plan: account.plan(),
            is_trial_active: account.is_trial_active_at(now),
            is_subscription_active: account.is_subscription_active(),
            has_valid_access: account.has_valid_access_at(now),
            days_left_in_trial: account.days_left_in_trial_at(now),
            trial_ends_at: account.trial_ends_at.map(|t| t.with_timezone(&Utc)),
            subscription_ends_at: account.subscription_ends_at.map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::prelude::DateTimeWithTimeZone;
    use uuid::Uuid;

    fn account(status: SubscriptionStatus, trial_ends_at: Option<DateTime<Utc>>) -> Account {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            email: "writer@example.com".into(),
            password_hash: Some("hash".into()),
            federated_id: None,
            first_name: "Ada".into(),
            last_name: "Writer".into(),
            subscription_status: status.into(),
            subscription_plan: SubscriptionPlan::None.into(),
            customer_ref: None,
            trial_ends_at: trial_ends_at.map(Into::into),
            subscription_ends_at: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn test_start_trial_sets_seven_day_window() {
        let now = Utc::now();
        let mut active = AccountActiveModel::default();
        start_trial(&mut active, now);

        assert_eq!(
            active.subscription_status,
            Set(SubscriptionStatus::Trial.as_str().to_string())
        );
        let expected: DateTimeWithTimeZone = (now + Duration::days(7)).into();
        assert_eq!(active.trial_ends_at, Set(Some(expected)));
    }

    #[test]
    fn test_trial_active_until_end() {
        let now = Utc::now();
        let acct = account(SubscriptionStatus::Trial, Some(now + Duration::days(3)));
        assert!(acct.is_trial_active_at(now));
        assert!(acct.has_valid_access_at(now));
        assert!(!acct.is_trial_active_at(now + Duration::days(3)));
    }

    #[test]
    fn test_trial_without_end_date_has_no_access() {
        let acct = account(SubscriptionStatus::Trial, None);
        assert!(!acct.has_valid_access_at(Utc::now()));
        assert!(!acct.is_trial_expiry_due(Utc::now()));
    }

    #[test]
    fn test_active_subscription_has_access() {
        let now = Utc::now();
        let acct = account(SubscriptionStatus::Active, Some(now - Duration::days(30)));
        assert!(acct.has_valid_access_at(now));
        assert!(!acct.is_trial_active_at(now));
    }

    #[test]
    fn test_inactive_statuses_have_no_access() {
        let now = Utc::now();
        for status in [
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Incomplete,
            SubscriptionStatus::TrialExpired,
        ] {
            let acct = account(status, Some(now + Duration::days(5)));
            assert!(!acct.has_valid_access_at(now), "{:?}", status);
        }
    }

    #[test]
    fn test_days_left_floors_and_clamps() {
        let now = Utc::now();
        let acct = account(
            SubscriptionStatus::Trial,
            Some(now + Duration::days(6) + Duration::hours(23)),
        );
        assert_eq!(acct.days_left_in_trial_at(now), 6);

        let expired = account(SubscriptionStatus::Trial, Some(now - Duration::hours(1)));
        assert_eq!(expired.days_left_in_trial_at(now), 0);

        let active = account(SubscriptionStatus::Active, Some(now + Duration::days(4)));
        assert_eq!(active.days_left_in_trial_at(now), 0);
    }

    #[test]
    fn test_subscription_required_flags_lapsed_trial() {
        let now = Utc::now();
        let lapsed = account(SubscriptionStatus::Trial, Some(now - Duration::days(1)));
        match lapsed.subscription_required(now) {
            AppError::SubscriptionRequired { subscription_status, trial_expired } => {
                assert_eq!(subscription_status, "trial");
                assert!(trial_expired);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let past_due = account(SubscriptionStatus::PastDue, None);
        match past_due.subscription_required(now) {
            AppError::SubscriptionRequired { trial_expired, .. } => assert!(!trial_expired),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_gate_notice() {
        let now = Utc::now();
        let lapsed = account(SubscriptionStatus::TrialExpired, Some(now - Duration::days(1)));
        let notice = GateNotice::for_account(&lapsed);
        assert_eq!(notice, GateNotice::TrialExpired);
        assert_eq!(notice.redirect_path(), "/pricing?notice=trial_expired");

        let canceled = account(SubscriptionStatus::Canceled, None);
        let notice = GateNotice::for_account(&canceled);
        assert_eq!(GateNotice::from_code(notice.code()), Some(GateNotice::SubscriptionInactive));
        assert!(notice.message().starts_with("Your subscription is inactive"));
    }

    #[test]
    fn test_snapshot() {
        let now = Utc::now();
        let acct = account(SubscriptionStatus::Trial, Some(now + Duration::days(2)));
        let snapshot = EntitlementSnapshot::of(&acct, now);
        assert!(snapshot.has_valid_access);
        assert_eq!(snapshot.days_left_in_trial, 2);
        assert_eq!(snapshot.subscription_status, SubscriptionStatus::Trial);
    }
}
