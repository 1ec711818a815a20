//! Bank Mail Sync Library
//! # Overview
//!
//! This library turns bank notification emails into accounting entries: it
//! fetches the messages received since the last run, parses each one with
//! the rules of the bank that sent it, registers the transaction in the
//! ledger of the user it was addressed to, archives the messages and texts
//! every user a summary.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Message, TransactionInfo, UserConfig, errors)
//! - [`pipe`] - Cancellable stream combinators the pipeline is assembled from
//! - [`bank`] - Per-bank parsing rules over notification bodies
//! - [`mail`] - Mailbox access: client pool, MIME parsing, parallel fetch
//! - [`repository`] - Watermark and user-config storage
//! - [`accounting`] - Ledger clients and transaction registration
//! - [`notify`] - SMS run summaries
//! - [`sync`] - The orchestrator tying every stage together
//! - [`local`] - File-backed implementations of every collaborator
//! - [`settings`] / [`cli`] - Configuration and command-line parsing
//!
//! # Failure Model
//!
//! Per-message and per-transaction failures never stop a run:
//!
//! - **Fetch failures**: logged and skipped
//! - **Parse failures**: moved to the parse-error mailbox
//! - **Registration failures**: left in the inbox and retried on the next
//!   run through the watermark
//!
//! Only configuration and sanity problems surface as a [`SyncError`].

// Module declarations
pub mod accounting;
pub mod bank;
pub mod cli;
pub mod local;
pub mod mail;
pub mod notify;
pub mod pipe;
pub mod repository;
pub mod settings;
pub mod sync;
pub mod types;

pub use sync::{SyncOptions, SyncReport, Synchronizer};
pub use types::{
    AccountingError, Amount, BankError, MailError, Message, MessageId, NotifyError, PipeError,
    StoreError, SyncError, TransactionInfo, TransactionKind, UserConfig,
};
