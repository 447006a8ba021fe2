// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # sockwatch - Socket readiness dispatcher for pub/sub client transactions
//!
//! One background thread drives every in-flight HTTP transaction of a
//! publish/subscribe client: it waits for readiness on their sockets, hands
//! out-of-band work to them, and times them out when their deadline passes.
//! The protocol state machine itself stays outside; it plugs in as a
//! [`Driver`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sockwatch::{Context, Dispatcher, DispatcherConfig, Driver, Phase, Result, Step, Transaction};
//!
//! struct Publish {
//!     phase: Phase,
//! }
//!
//! impl Driver for Publish {
//!     /// HTTP status, or 0 on timeout.
//!     type Outcome = u16;
//!
//!     fn phase(&self) -> Phase {
//!         self.phase
//!     }
//!
//!     fn advance(&mut self, _cx: &mut Context<'_, Self>) -> Step<Self::Outcome> {
//!         Step::Pending
//!     }
//!
//!     fn timed_out(&mut self, _cx: &mut Context<'_, Self>) -> Self::Outcome {
//!         0
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let dispatcher = Dispatcher::initialize(DispatcherConfig::default())?;
//!     let txn = Transaction::new(Publish { phase: Phase::Idle });
//!     txn.on_complete(|txn, outcome| println!("{} finished: {:?}", txn.id(), outcome));
//!     dispatcher.enqueue(&txn)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                       Client library threads                        |
//! |   socket_acquired | socket_lost | socket_changed | enqueue/requeue  |
//! +---------------------------------------------------------------------+
//! |                            Dispatcher                               |
//! |   SocketRegistry + DeadlineList   (re-entrant registry/timer lock)  |
//! |   DeferredQueue                   (queue lock)                      |
//! +---------------------------------------------------------------------+
//! |                        Dispatcher thread                            |
//! |   deferred step -> poll step -> deadline step -> (idle wait)        |
//! +---------------------------------------------------------------------+
//! |                            Platform                                 |
//! |   poll(2) on unix | WSAPoll on windows                              |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Dispatcher`] | Owns the background thread and every shared structure |
//! | [`Transaction`] | A driver behind its monitor, plus completion callback |
//! | [`Driver`] | The external protocol state machine |
//! | [`Context`] | What a running driver may do to its own transaction |
//! | [`DispatcherConfig`] | Poll timeout, queue capacity, growth step, deadlines |
//!
//! ## Modules Overview
//!
//! - [`dispatcher`] - The loop and its public entry points (start here)
//! - [`registry`] - Socket -> transaction table with watched interest
//! - [`queue`] - Fixed-capacity deferred-work ring
//! - [`deadline`] - Virtual-clock timeout list
//! - [`platform`] - Native socket handles and the poll primitive

pub mod config;
pub mod deadline;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod platform;
pub mod queue;
pub mod registry;
pub mod transaction;

pub use config::{
    DispatcherConfig, DEFAULT_POLL_TIMEOUT, DEFAULT_QUEUE_CAPACITY, DEFAULT_REGISTRY_GROWTH,
    DEFAULT_TRANSACTION_TIMEOUT,
};
pub use deadline::DeadlineList;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use metrics::{DispatcherMetrics, MetricsSnapshot};
pub use platform::{NativeSocket, RawSocketHandle};
pub use queue::{DeferredQueue, Queued};
pub use registry::SocketRegistry;
pub use transaction::{Context, Driver, Interest, Phase, Step, Tracked, Transaction, TxnId, TxnRef};
