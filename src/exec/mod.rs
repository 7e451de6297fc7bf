// src/exec/mod.rs

//! Apply execution layer.
//!
//! - [`backend`] defines the [`ApplyBackend`] capability the coordinator is
//!   given, plus the tagged [`ApplyFailure`] and [`Heartbeat`] handle.
//! - [`task`] describes one dispatch of one module.
//! - [`supervisor`] bounds an attempt by its timeout and heartbeat.
//! - [`retry`] holds the backoff policy.
//! - [`terragrunt`] is the production backend running the tool as a child
//!   process.

pub mod backend;
pub mod retry;
pub mod supervisor;
pub mod task;
pub mod terragrunt;

pub use backend::{ApplyBackend, ApplyFailure, ApplyResult, Heartbeat};
pub use retry::{RetryPolicy, with_retry};
pub use supervisor::{AttemptOutcome, supervise};
pub use task::{ApplyPolicy, ApplyTask, task_id_for};
pub use terragrunt::TerragruntBackend;
