//! Property-based tests for history truncation and href resolution.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.
