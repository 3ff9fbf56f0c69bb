//! Core data types: enums, identifiers, contexts and order structures.

pub mod context;
pub mod enums;
pub mod market;
pub mod trading;

pub use context::*;
pub use enums::*;
pub use market::*;
pub use trading::*;
