//! # stopline-core
//!
//! Core crate for the stopline spot execution system, providing:
//!
//! - **Money** (`money`): exact decimal wrapper that refuses float coercion
//! - **Types** (`types`): exchange/market identifiers, trade and order contexts, order structs
//! - **Configuration** (`config`): JSON config deserialization (edges, rate limits, denylist)
//! - **Error types** (`error`): `MoneyError`, `StoreError`, `CoreError` via thiserror
//! - **Persistence** (`store`): position/order-context contract and an in-memory implementation
//! - **Notifications** (`notify`): best-effort operator alert channel
//! - **Time utilities** (`time_util`): wall-clock timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod money;
pub mod notify;
pub mod store;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use money::{Money, RoundingMode};
pub use types::*;
