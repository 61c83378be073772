//! `rollbook-recon` — Student-registry reconciliation and dedup engine.
//!
//! Pure engine crate: receives pre-loaded snapshots, returns one immutable
//! report per run. Snapshot parsing lives here; database writes do not.

pub mod config;
pub mod dedup;
pub mod divergence;
pub mod engine;
pub mod error;
pub mod grade;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod report;
pub mod signal;
pub mod snapshot;
pub mod tier;

pub use config::ReconConfig;
pub use engine::run;
pub use error::ReconError;
pub use model::{ReconInput, ReconReport};
