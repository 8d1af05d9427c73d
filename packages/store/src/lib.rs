//! Platform-neutral client logic for Yieldnest: the session state machine,
//! data-fetch sequencing, realtime reconciliation and route guards. Nothing
//! here renders; the `ui` crate drives these types from Dioxus hooks.

pub mod backend;
pub mod collection;
pub mod config;
pub mod controller;
pub mod error;
pub mod guard;
pub mod live;
pub mod models;
pub mod persist;
pub mod query;
pub mod session;
pub mod time;

#[cfg(test)]
mod testing;

pub use backend::{AuthBackend, AuthEvent, RegisterRequest, SignUpOutcome};
pub use collection::{ChangeEvent, ChangeKind, Collection, Keyed};
pub use config::SessionConfig;
pub use controller::SessionController;
pub use error::{AuthError, BackendError};
pub use guard::{GuardDecision, Requirement};
pub use live::{MountGuard, MountHandle};
pub use models::{
    AdminStats, DashboardStats, Identity, Investment, InvestmentPlan, InvestmentStatus,
    NewInvestment, NewTransaction, Profile, ProfileUpdate, Role, Session, Transaction,
    TransactionStatus, TransactionType, User,
};
pub use persist::{MemorySessionStorage, SessionStorage, SESSION_KEY};
pub use query::{FetchState, Query, Ticket};
pub use session::{AuthSession, SessionState};
