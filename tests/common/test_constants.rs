//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

#![allow(dead_code, reason = "each test crate uses a different subset")]

/// API key accepted by configuration validation.
pub const TEST_API_KEY: &str = "test-api-key";

/// Base URL nothing listens on; tests must fail before reaching it.
pub const UNREACHABLE_BASE_URL: &str = "http://127.0.0.1:9";

/// Container image used in job requests.
pub const TEST_CONTAINER: &str = "tensorflow/tensorflow:latest-gpu";

/// Machine type used in job requests.
pub const TEST_MACHINE_TYPE: &str = "P4000";
