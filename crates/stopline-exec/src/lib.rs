//! # stopline-exec
//!
//! Command layer of the stopline system:
//!
//! - **Edges** (`edges`): strategy registry, edge authorization and the
//!   base-asset denylist
//! - **Sizing** (`sizer`): fixed and risk-based position sizing
//! - **Executors** (`executor`): entry → protect → (dump) state machine with
//!   Stop-Limit-Exit and OCO-Exit strategies
//! - **Commands / results** (`commands`, `results`): typed command inputs and
//!   closed per-operation result enums with HTTP status and severity
//! - **Service** (`service`): `open_long`, `close`, `move_stop` dispatcher

pub mod commands;
pub mod edges;
pub mod executor;
pub mod results;
pub mod service;
pub mod sizer;

pub use commands::{CloseCommand, MoveStopCommand, OpenLongCommand};
pub use results::{CloseResult, CommandOutcome, CommandResponse, MoveStopResult, OpenLongResult};
pub use service::TradeAbstractionService;
