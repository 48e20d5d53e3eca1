//! Domain Layer - Core relay types and business rules.
//!
//! This layer contains the core domain types for price relaying with no
//! I/O. Everything here is synchronous and can be exercised directly from
//! unit and property tests.

/// Price ticks, symbols, and subscriber-facing updates.
pub mod streaming;

/// Last-price cache and random-walk pricing.
pub mod pricing;

/// Topic membership tracking.
pub mod subscription;
