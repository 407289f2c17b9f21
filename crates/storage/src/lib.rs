//! Storage layer for toolscribe
//!
//! Single-file SQLite store behind an r2d2 connection pool. Holds the five
//! durable entities (sessions, observations, summaries, prompts, pending
//! messages) plus the row scans the token metrics engine aggregates over.
//!
//! Writes are serialized by SQLite's writer lock (WAL mode); readers observe
//! a consistent prefix.

#![allow(
    unused_results,
    reason = "SQL execute() returns row count which is often unused in INSERT/UPDATE operations"
)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    reason = "SQLite i64 <-> Rust usize conversions are bounded by row counts"
)]

mod migrations;
mod store;
#[cfg(test)]
mod tests;

pub use store::{ObservationCost, Store, TokenStatRow};
