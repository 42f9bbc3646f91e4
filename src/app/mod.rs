//! Run orchestration: config, URL list, error log and engine wired together.

mod runtime;

pub use runtime::{RunPhase, RunReport, SetupError, run, run_with_config};
