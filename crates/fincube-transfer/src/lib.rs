//! # fincube-transfer — Transfer Orchestration
//!
//! Executes member-to-member transfers. Same-organization transfers touch
//! only the ledger; cross-organization transfers carry a membership proof
//! for the receiver and settle through the FinCube contract before the
//! ledger is updated.
//!
//! - [`request`]: caller request and validation.
//! - [`state`]: the transfer state machine and per-transfer trace.
//! - [`orchestrator`]: routing and execution.
//! - [`response`]: intra-org, cross-org and partial outcomes.
//! - [`events`]: at-least-once audit events with a dead-letter backlog.
//! - [`reconcile`]: backlog of ledger updates owed by partial outcomes.

pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod reconcile;
pub mod request;
pub mod response;
pub mod state;

pub use config::{EventConfig, TransferConfig};
pub use error::{ErrorDetail, TransferError, TransferFailure, TransferStage};
pub use events::{
    AuditEvent, AuditStatus, DeadLetterQueue, EventPublisher, EventSink, LogSink, RecordingSink,
    ReplayReport, UndeliveredEvent, WebhookSink,
};
pub use orchestrator::TransferOrchestrator;
pub use reconcile::{PendingLedgerUpdate, ReconcileError, ReconcileReport, ReconciliationQueue};
pub use request::{TransferRequest, ValidatedTransfer};
pub use response::{BlockchainResult, TransferMode, TransferOutcome, TransferReport};
pub use state::{TransferState, TransferTrace};
