//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-9     | recon            | Reconciliation outcome and failures      |
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

/// Success - every canonical record reconciled, or config is valid.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// clap exits with this code on its own for argument errors.
#[allow(dead_code)]
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Recon (3-9)
// =============================================================================

/// Run completed and produced at least one alert.
pub const EXIT_RECON_ALERTS: u8 = 3;

/// Config could not be parsed or failed validation.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 4;

/// Config or input files could not be read, or output could not be written.
pub const EXIT_RECON_RUNTIME: u8 = 5;
