//! Property-based tests for resocket.
//!
//! Run with: cargo test --test property_tests
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold across the backoff policy and the listener registry.

pub mod backoff;
pub mod registry;
