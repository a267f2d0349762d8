//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `fbook` exit codes.
//! Exit codes are part of the shell contract: cron jobs and wrappers
//! around `fbook sync` rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-9     | sync             | Reconciliation run outcomes              |
//! | 50-59   | feed             | HTTP order feed / customer directory     |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options, unreadable input.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Sync (3-9)
// =============================================================================

/// The run finished but at least one step failed (fetch, snapshot, append).
/// The report lists which ones; successful steps were still committed.
pub const EXIT_SYNC_STEP_FAILED: u8 = 3;

/// Sync config could not be parsed or failed validation.
pub const EXIT_SYNC_INVALID_CONFIG: u8 = 4;

/// Another run holds the sync lock. Nothing was written.
pub const EXIT_SYNC_LOCKED: u8 = 5;

/// The attendance database could not be opened, or the lock could not be
/// taken/released at all.
pub const EXIT_SYNC_STORE: u8 = 6;

// =============================================================================
// Feed (50-59) - HTTP order feed and customer directory
// =============================================================================

/// No feed token available (neither keychain nor env var).
pub const EXIT_FEED_NOT_AUTH: u8 = 50;

/// Token rejected by the feed (401/403).
pub const EXIT_FEED_AUTH: u8 = 51;

/// Request rejected by the feed (400).
pub const EXIT_FEED_VALIDATION: u8 = 52;

/// Rate limited after retries (429).
pub const EXIT_FEED_RATE_LIMIT: u8 = 53;

/// Upstream error (5xx), malformed response, or network failure after retries.
pub const EXIT_FEED_UPSTREAM: u8 = 54;
