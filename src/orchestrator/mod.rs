//! Application-level orchestration utilities.
//!
//! Post-run processing (report building, auto-save, exports) lives here so the
//! CLI layer only deals with presentation.

mod post_process;

pub(crate) use post_process::process_run_completion;
