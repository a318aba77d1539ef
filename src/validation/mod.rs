//! Post-agent validation.
//!
//! After the agent finishes, the task's success command runs in a new shell
//! inside the same container. It never reuses a shell the agent used, so it
//! only observes state the agent persisted: installed packages, files,
//! profile settings, and daemons that outlive their launching shell.

pub mod validator;

pub use validator::{SuccessCriterion, ValidationOutcome, Validator, SUCCESS_MARKER};
