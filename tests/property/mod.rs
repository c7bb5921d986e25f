//! Property-based tests for sweep guarantees
