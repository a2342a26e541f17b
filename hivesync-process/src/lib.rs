//! hivesync process library: steps, rollback-capable chains, the removal
//! verifier and the dependency-tree scheduler.
//!
//! - [`step`] — [`ProcessStep`], the unit of work
//! - [`process`] — [`Process`], a chain of steps with reverse-order rollback
//! - [`compensating`] — [`CompensatingPut`], a write undone by a remove
//! - [`verify`] — [`RemovalVerifier`], remove-then-confirm with bounded retries
//! - [`tree`] — [`ProcessTree`], parent-before-children scheduling

pub mod compensating;
pub mod error;
pub mod process;
pub mod step;
pub mod tree;
pub mod verify;

pub use compensating::{CompensatingPut, EndChain, PutHandler, WriteState};
pub use error::{io_err, ProcessError};
pub use process::{Process, ProcessState, Runnable};
pub use step::{done, next, NextStep, ProcessStep};
pub use tree::{Attachment, FailureSink, NodeId, ProcessTree, Problems, TreeHandle, ROOT};
pub use verify::{RemovalListener, RemovalOutcome, RemovalVerifier};
