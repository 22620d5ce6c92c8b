//! Download task execution -- byte transfer of one task and its completion.
//!
//! Split into focused submodules:
//! - [`context`] - Per-run state and the task updates a run is allowed to make
//! - [`orchestration`] - Descriptor fetch, budget pre-check, streaming to a partial file
//! - [`finalization`] - Ledger recording, final status, thumbnails

mod context;
mod finalization;
mod orchestration;


pub(crate) use context::DownloadTaskContext;
pub(crate) use orchestration::run_download_task;
