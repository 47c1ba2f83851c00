//! Domain Layer - Core book types and business logic.
//!
//! This layer contains the order-book and subscription domain types
//! with no transport or exchange dependencies.

/// Order-book state and derived quotes.
pub mod book;

/// Subscription tracking.
pub mod subscription;
