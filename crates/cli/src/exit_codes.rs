//! Exit code registry for the `rollbook` binary.
//!
//! These codes are the scripting contract: cron wrappers and sync
//! scripts branch on them, so changing one is a breaking change.
//! Every code lives here with the condition that triggers it; commands
//! import constants instead of writing literals.
//!
//! | Code | Domain    | Description                                    |
//! |------|-----------|------------------------------------------------|
//! | 0    | Universal | Success                                        |
//! | 1    | Universal | General error (unspecified)                    |
//! | 2    | Universal | CLI usage error (bad args, mismatched inputs)  |
//! | 3    | run       | Divergences found                              |
//! | 4    | run       | Review-tier pairs pending adjudication         |
//! | 5    | config    | Invalid config (parse or validation)           |
//! | 6    | run/apply | Runtime error (IO, malformed snapshot)         |
//! | 7    | apply     | Plan applied incompletely                      |

use rollbook_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Unspecified failure. Reserved for broken artifacts nothing else
/// covers; prefer a specific code.
pub const EXIT_ERROR: u8 = 1;

/// Bad arguments, or a report applied against a config that did not
/// produce it.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Run (3-4)
// =============================================================================

/// The run found divergences that need action beyond adjudication.
pub const EXIT_DIVERGENCES: u8 = 3;

/// Every finding traces back to a review-tier pair; adjudicate and re-run.
pub const EXIT_REVIEW_PENDING: u8 = 4;

// =============================================================================
// Config + runtime (5-6)
// =============================================================================

/// Config failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 5;

/// Runtime failure: unreadable file, malformed snapshot, engine error.
pub const EXIT_RUNTIME: u8 = 6;

// =============================================================================
// Apply (7)
// =============================================================================

/// At least one dedup group failed to apply and was rolled back.
pub const EXIT_APPLY_INCOMPLETE: u8 = 7;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::MissingColumn { .. }
        | ReconError::IdParse { .. }
        | ReconError::CountParse { .. }
        | ReconError::SnapshotParse { .. }
        | ReconError::Io(_) => EXIT_RUNTIME,
    }
}
