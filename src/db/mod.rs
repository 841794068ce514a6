//! Storage module for pingtrail.
//!
//! Holds the check result model and the bounded JSON log store.

mod models;
mod store;

pub use models::*;
pub use store::*;
