//! push-relay - forwards home-automation events to an HTTP API and keeps a
//! durable on-disk queue of the ones that could not be delivered.
//!
//! Each event is attempted once. Failures are appended to a day-partitioned
//! queue file; the next successful delivery drains the queue by replaying
//! every queued line.

pub mod cli;
pub mod clock;
pub mod config;
pub mod forward;
pub mod log;
pub mod queue;
pub mod relay;
pub mod server;
pub mod signing;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
