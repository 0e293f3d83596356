//! Trip lifecycle and payment reconciliation workflow engine.
//!
//! A freight trip moves along a guarded stage chain from request intake to
//! closure, while advance and final payment requests go through their own
//! review and payment cycle. [`service::WorkflowService`] is the only writer;
//! everything else is either a pure rule ([`guard`], [`reconcile`], [`stage`])
//! or a collaborator seam ([`directory`], [`timeline`]).

pub mod config;
pub mod directory;
pub mod error;
pub mod guard;
pub mod payment;
pub mod reconcile;
pub mod service;
pub mod stage;
pub mod store;
pub mod timeline;
pub mod trip;
pub mod types;
pub mod utils;

pub use config::{AdvanceResubmission, WorkflowConfig};
pub use error::{ErrorKind, WorkflowError};
pub use service::{TripView, WorkflowService};
