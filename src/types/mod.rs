//! Core value types shared across the relay.

pub mod ids;

pub use ids::{ClaimantId, DayKey};
