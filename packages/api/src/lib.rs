//! # API crate: typed client for the Yieldnest backend
//!
//! Everything that talks to the network lives here. The session logic in
//! `store` only sees the [`store::AuthBackend`] trait, which [`Backend`]
//! implements.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Backend URL, anon key and API URL from the build/run-time environment |
//! | [`backend`] | Auth service and PostgREST tables (profiles, plans, transactions, investments), session persistence and auth events |
//! | [`http`] | Bearer-token client for the HTTP API with uniform 401 handling |
//! | [`realtime`] | Phoenix-channel websocket client for row change notifications |

pub mod backend;
pub mod config;
pub mod http;
pub mod realtime;

pub use backend::{Backend, Dashboard};
pub use config::{BackendConfig, ConfigError};
pub use http::{ApiClient, ApiError, TokenSource};
pub use realtime::{ChangeFeed, RealtimeError, Subscription};
