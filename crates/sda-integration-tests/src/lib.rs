//! Integration test crate for the SDA wrapper.
//!
//! This crate has no library code - it only contains integration tests that
//! exercise end-to-end flows across the lower crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p sda-integration-tests
//! ```
