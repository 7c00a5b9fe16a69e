//! Ledger Derivation Engine
//!
//! Consumes streaming snapshots of expense/settlement records and group
//! rosters and produces materialized, idempotently-recomputed balance
//! state:
//! - Subscription coordination keyed by the current identity
//! - Deduplicated profile resolution with a session-scoped cache
//! - Pure, deterministic balance building with exact decimal splitting
//! - Per-scope derived views with change notification
//!
//! # Architecture
//!
//! ```text
//! Identity changes          Store snapshots
//!        │                        │
//!  ┌─────▼──────┐          ┌──────▼──────┐
//!  │Coordinator │          │ DerivedView │
//!  │ (streams,  │─scopes──▶│   Store     │
//!  │  cache)    │          └──────┬──────┘
//!  └─────┬──────┘                 │ recompute per scope
//!        │                 ┌──────▼──────┐
//!   StoreCommands          │LedgerBuilder│
//!   (to transport)         │  (pure)     │
//!                          └──────┬──────┘
//!                                 │
//!                          BalanceState + change notifications
//! ```
//!
//! The engine is single-threaded and event-driven: each delivered snapshot
//! runs to completion (slice replacement, full recompute, notification)
//! before the next event is processed, so the builder never observes a
//! torn raw-state slice.

pub mod cache;
pub mod coordinator;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod settlement;
pub mod store;
pub mod view;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
