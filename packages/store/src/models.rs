//! # Domain models for sessions, users, plans and money movements
//!
//! Every type here is a cache of a row (or response) owned by the hosted
//! backend. They are `Serialize + Deserialize` so the same structs are used to
//! decode REST responses, realtime payloads and the persisted session.
//!
//! ## Types
//!
//! | Struct | Represents |
//! |--------|-----------|
//! | [`Session`] | Access/refresh token pair issued by the auth service, with its expiry. |
//! | [`Identity`] | The auth-service user embedded in a session. |
//! | [`Profile`] | Row of the `profiles` table (name, phone, role, KYC status). |
//! | [`User`] | Identity merged with its profile; what the UI reads. |
//! | [`InvestmentPlan`] | Row of `investment_plans`. |
//! | [`Transaction`] | Deposit or withdrawal request in `transactions`. |
//! | [`Investment`] | A user's position in a plan (`investments`). |
//! | [`DashboardStats`] | Totals derived client-side from transactions and investments. |
//! | [`AdminStats`] | Platform-wide totals served by the admin API. |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Credential bundle issued by the auth service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds at issue time.
    #[serde(default)]
    pub expires_in: i64,
    /// Absolute expiry as unix seconds.
    #[serde(default)]
    pub expires_at: i64,
    pub user: Identity,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Fill in `expires_at` from `expires_in` when the server omitted it.
    pub fn with_expiry_from(mut self, now: i64) -> Self {
        if self.expires_at == 0 && self.expires_in > 0 {
            self.expires_at = now + self.expires_in;
        }
        self
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// The user object of the auth service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Access level stored on the profile row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    #[serde(other)]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Row of the `profiles` table, keyed by the identity id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub kyc_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Editable subset of a profile. `None` leaves the column untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// The signed-in user as the UI sees it.
///
/// Built from an [`Identity`]; profile fields are optional and default to
/// empty so a missing profile row never blocks authentication.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub kyc_status: Option<String>,
}

impl User {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            role: Role::User,
            email_verified: identity.email_confirmed_at.is_some(),
            full_name: None,
            phone: None,
            kyc_status: None,
        }
    }

    /// Merge a profile row into the user. Identity fields win over the
    /// profile copy of the email.
    pub fn with_profile(mut self, profile: Option<&Profile>) -> Self {
        if let Some(profile) = profile {
            self.role = profile.role;
            self.full_name = profile.full_name.clone();
            self.phone = profile.phone.clone();
            self.kyc_status = profile.kyc_status.clone();
            if self.email.is_empty() {
                self.email = profile.email.clone();
            }
        }
        self
    }

    /// Apply identity changes (e.g. email confirmation) without losing
    /// profile fields.
    pub fn merge_identity(&mut self, identity: &Identity) {
        if !identity.email.is_empty() {
            self.email = identity.email.clone();
        }
        self.email_verified = identity.email_confirmed_at.is_some();
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Name to show in the UI, falling back to the email address.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.email)
    }
}

/// Row of the `investment_plans` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvestmentPlan {
    pub id: String,
    pub name: String,
    pub min_amount: Decimal,
    #[serde(default)]
    pub max_amount: Option<Decimal>,
    pub return_percentage: Decimal,
    pub duration_days: i32,
    pub total_return: Decimal,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub features: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl InvestmentPlan {
    /// Whether `amount` fits the plan's bounds.
    pub fn accepts(&self, amount: Decimal) -> bool {
        amount >= self.min_amount && self.max_amount.map_or(true, |max| amount <= max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Row of the `transactions` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a deposit or withdrawal request. Status is always
/// `pending`; the backend settles it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewTransaction {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
}

impl NewTransaction {
    pub fn pending(user_id: impl Into<String>, kind: TransactionType, amount: Decimal) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            amount,
            status: TransactionStatus::Pending,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentStatus {
    Active,
    Completed,
    Cancelled,
}

/// Row of the `investments` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub amount: Decimal,
    pub status: InvestmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewInvestment {
    pub user_id: String,
    pub plan_id: String,
    pub amount: Decimal,
    pub status: InvestmentStatus,
}

/// Per-user totals shown on the dashboard.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub balance: Decimal,
    pub total_invested: Decimal,
    pub total_returns: Decimal,
    pub active_investments: usize,
}

impl DashboardStats {
    /// Balance is completed deposits minus completed withdrawals minus the
    /// principal locked in active investments. Pending and failed rows do not
    /// count.
    pub fn compute(
        transactions: &[Transaction],
        investments: &[Investment],
        plans: &[InvestmentPlan],
    ) -> Self {
        let mut settled = Decimal::ZERO;
        for tx in transactions {
            if tx.status != TransactionStatus::Completed {
                continue;
            }
            match tx.kind {
                TransactionType::Deposit => settled += tx.amount,
                TransactionType::Withdrawal => settled -= tx.amount,
            }
        }

        let mut stats = DashboardStats::default();
        for inv in investments {
            let plan = plans.iter().find(|p| p.id == inv.plan_id);
            let rate = plan.map_or(Decimal::ZERO, |p| p.return_percentage);
            match inv.status {
                InvestmentStatus::Active => {
                    stats.active_investments += 1;
                    stats.total_invested += inv.amount;
                    stats.total_returns += inv.amount * rate / Decimal::ONE_HUNDRED;
                }
                InvestmentStatus::Completed => {
                    stats.total_returns += inv.amount * rate / Decimal::ONE_HUNDRED;
                }
                InvestmentStatus::Cancelled => {}
            }
        }
        stats.balance = settled - stats.total_invested;
        stats
    }
}

/// Platform totals returned by the admin stats endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_users: u64,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub pending_transactions: u64,
    pub active_investments: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn identity() -> Identity {
        Identity {
            id: "u1".into(),
            email: "ada@example.com".into(),
            email_confirmed_at: None,
            created_at: None,
        }
    }

    #[test]
    fn test_unknown_role_is_user() {
        let profile: Profile =
            serde_json::from_str(r#"{"id":"u1","email":"a@b.c","role":"superuser"}"#).unwrap();
        assert_eq!(profile.role, Role::User);
        let profile: Profile = serde_json::from_str(r#"{"id":"u1","role":"admin"}"#).unwrap();
        assert_eq!(profile.role, Role::Admin);
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), r#""admin""#);
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
    }

    #[test]
    fn test_user_without_profile_is_usable() {
        let user = User::from_identity(&identity()).with_profile(None);
        assert_eq!(user.id, "u1");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.role, Role::User);
        assert!(user.full_name.is_none());
        assert_eq!(user.display_name(), "ada@example.com");
    }

    #[test]
    fn test_profile_merge() {
        let profile = Profile {
            id: "u1".into(),
            full_name: Some("Ada".into()),
            role: Role::Admin,
            ..Default::default()
        };
        let user = User::from_identity(&identity()).with_profile(Some(&profile));
        assert!(user.is_admin());
        assert_eq!(user.display_name(), "Ada");
        assert_eq!(user.email, "ada@example.com");
    }

    #[test]
    fn test_session_expiry_backfill() {
        let json = r#"{"access_token":"a","refresh_token":"r","expires_in":3600,
            "user":{"id":"u1","email":"ada@example.com"}}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.expires_at, 0);
        let session = session.with_expiry_from(1_000);
        assert_eq!(session.expires_at, 4_600);
        assert!(!session.is_expired_at(4_599));
        assert!(session.is_expired_at(4_600));
    }

    #[test]
    fn test_transaction_decodes_numeric_amounts() {
        let json = r#"{"id":"t1","user_id":"u1","type":"withdrawal","amount":250.5,
            "status":"pending","created_at":"2026-01-02T03:04:05Z"}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.kind, TransactionType::Withdrawal);
        assert_eq!(tx.amount, Decimal::new(2505, 1));
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[test]
    fn test_dashboard_stats_ignore_unsettled_rows() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let tx = |id: &str, kind, amount: i64, status| Transaction {
            id: id.into(),
            user_id: "u1".into(),
            kind,
            amount: Decimal::from(amount),
            status,
            created_at: at,
        };
        let transactions = vec![
            tx("1", TransactionType::Deposit, 1000, TransactionStatus::Completed),
            tx("2", TransactionType::Deposit, 500, TransactionStatus::Pending),
            tx("3", TransactionType::Withdrawal, 200, TransactionStatus::Completed),
            tx("4", TransactionType::Withdrawal, 50, TransactionStatus::Failed),
        ];
        let plans = vec![InvestmentPlan {
            id: "p1".into(),
            name: "Starter".into(),
            min_amount: Decimal::from(100),
            max_amount: None,
            return_percentage: Decimal::from(10),
            duration_days: 30,
            total_return: Decimal::from(110),
            is_active: true,
            features: vec![],
        }];
        let investments = vec![Investment {
            id: "i1".into(),
            user_id: "u1".into(),
            plan_id: "p1".into(),
            amount: Decimal::from(300),
            status: InvestmentStatus::Active,
            created_at: at,
        }];

        let stats = DashboardStats::compute(&transactions, &investments, &plans);
        assert_eq!(stats.balance, Decimal::from(500));
        assert_eq!(stats.total_invested, Decimal::from(300));
        assert_eq!(stats.total_returns, Decimal::from(30));
        assert_eq!(stats.active_investments, 1);
    }

    #[test]
    fn test_plan_bounds() {
        let plan = InvestmentPlan {
            id: "p1".into(),
            name: "Gold".into(),
            min_amount: Decimal::from(100),
            max_amount: Some(Decimal::from(1000)),
            return_percentage: Decimal::from(12),
            duration_days: 90,
            total_return: Decimal::from(112),
            is_active: true,
            features: vec![],
        };
        assert!(!plan.accepts(Decimal::from(99)));
        assert!(plan.accepts(Decimal::from(100)));
        assert!(plan.accepts(Decimal::from(1000)));
        assert!(!plan.accepts(Decimal::from(1001)));
    }
}
