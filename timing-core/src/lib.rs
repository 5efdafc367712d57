//! timing-core — Data Types for the Gravity-MTB Timing Engine
//!
//! Pure data structures with no pipeline behavior. `timing-engine`
//! depends on this crate for its entity types, error taxonomy, and
//! formatting helpers. This crate contains no I/O.

mod clock;
mod config;
mod entities;
mod enums;
mod error;
mod identity;
mod observer;

pub use clock::*;
pub use config::*;
pub use entities::*;
pub use enums::*;
pub use error::*;
pub use identity::*;
pub use observer::*;
