#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Entity Engine
//!
//! A generic persistence layer for mutating shared records safely under
//! concurrent access and driving their lifecycle through a validated
//! sequence of states. Built for resource types (users, jobs, business
//! entities) that need multi-step writes that appear atomic, protection
//! against two callers overwriting each other, and a durable, queryable
//! history of status changes, some of which trigger further asynchronous
//! work.
//!
//! ## Architecture
//!
//! - **Transaction Coordinator** ([`transaction`]) runs a unit of work in a
//!   store session, retrying transient failures with backoff; it owns the
//!   session lifecycle only when no outer session is supplied, so engine
//!   operations compose into caller-level transactions.
//! - **Optimistic Locking Primitive** ([`occ`]) turns the entity's version
//!   counter into a compare-and-swap: a guarded write either advances the
//!   version by exactly 1 or fails cleanly as a conflict.
//! - **Status FSM / Audit Trail** ([`state_machine`], [`engine`]) validates
//!   transitions against a per-type table (strict or lenient), appends an
//!   immutable audit record, and runs the transition's effect, all inside
//!   one transaction.
//! - **FSM Job Driver** ([`driver`]) advances entities through long-running
//!   workflows job by job, rescheduling with staggered exponential backoff
//!   and refusing to reschedule stuck entities.
//!
//! The document store and job queue are external collaborators behind the
//! ports in [`store`] and [`queue`]; in-memory adapters ship for tests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use entity_engine::{EntityEngine, MemoryStore, StatusUpdate, Transition, TransitionTable};
//! # use entity_engine::{Auditable, AuditEntry, EntityId};
//! # use serde::{Deserialize, Serialize};
//! # use std::sync::Arc;
//! # #[derive(Clone, Serialize, Deserialize)]
//! # struct Order { id: EntityId, version: i64, status: String, audit_trail: Vec<AuditEntry> }
//! # impl Auditable for Order {
//! #     const TYPE_NAME: &'static str = "Order";
//! #     fn id(&self) -> EntityId { self.id }
//! #     fn version(&self) -> i64 { self.version }
//! #     fn set_version(&mut self, v: i64) { self.version = v; }
//! #     fn status(&self) -> &str { &self.status }
//! #     fn set_status(&mut self, s: String) { self.status = s; }
//! #     fn audit_trail(&self) -> &[AuditEntry] { &self.audit_trail }
//! #     fn audit_trail_mut(&mut self) -> &mut Vec<AuditEntry> { &mut self.audit_trail }
//! # }
//! # async fn example() -> entity_engine::Result<()> {
//! let table = TransitionTable::new()
//!     .allow("pending", Transition::to("active"))
//!     .terminal("active");
//! let engine = EntityEngine::new(Arc::new(MemoryStore::<Order>::new()), table);
//!
//! let order = Order {
//!     id: EntityId::new(),
//!     version: 0,
//!     status: "pending".into(),
//!     audit_trail: Vec::new(),
//! };
//! let order = engine.create(order, Some("user-1"), None).await?;
//! engine
//!     .update_status(order.id(), StatusUpdate::new("active"), None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod driver;
pub mod engine;
pub mod entity;
pub mod error;
pub mod logging;
pub mod occ;
pub mod queue;
pub mod state_machine;
pub mod store;
pub mod transaction;

pub use config::EngineConfig;
pub use driver::{backoff_delay, FsmJobDriver, HandlerOutcome, JobPhase, WorkflowHandler};
pub use engine::EntityEngine;
pub use entity::{AuditEntry, Auditable, EntityId, StatusUpdate};
pub use error::{EngineError, Result, StoreError};
pub use queue::{EnqueueRecord, JobQueue, JobState, MemoryJobQueue};
pub use state_machine::{FsmMode, Transition, TransitionEffect, TransitionTable};
pub use store::memory::{MemorySession, MemoryStore};
pub use store::{EntityStore, EntityUpdate, Session, SessionFactory, SessionHandle, VersionedFilter};
pub use transaction::TransactionCoordinator;
