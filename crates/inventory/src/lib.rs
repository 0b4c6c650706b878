//! Inventory catalog model (read side of the external catalog).
//!
//! The catalog itself is owned elsewhere; this crate only describes the records
//! the shelf audit reads and the single status transition it writes back.

pub mod record;

pub use record::{Identifier, InventoryRecord, ItemStatus, Location};
