//! Shared constants for end-to-end tests

/// Per-request timeout of the test client
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// How long to wait for a spawned server to answer
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Poll interval while waiting for a spawned server
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Sync deadline used by test servers
pub const SYNC_DEADLINE_SECS: u64 = 30;
