//! Command implementations for deck-cli

pub mod rollback;
pub mod state;
pub mod status;
pub mod sync;

pub use rollback::{run_history, run_rollback};
pub use state::{run_apply, run_diff, run_dump};
pub use status::run_status;
pub use sync::run_sync;
