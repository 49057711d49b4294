//! Custodia Types - Canonical domain types for the custodial ledger
//!
//! This crate contains the foundational types shared by every Custodia crate,
//! with zero dependencies on other custodia crates:
//!
//! - Identity types (AccountId, OperationId, EntryId)
//! - Assets (Native and the configured fungible Token)
//! - Amounts in smallest units, and 1e8-scaled USD values
//! - Roles gating deposits, withdrawals and administration
//! - The error taxonomy (validation, authorization, state, external)
//! - Notifications emitted by committed operations
//!
//! # Invariants
//!
//! 1. Amounts are unsigned and every arithmetic step is checked
//! 2. Internal storage is always the asset's smallest unit; decimals are
//!    only used for display and oracle scaling
//! 3. Every failure is a distinct, inspectable error kind

pub mod identity;
pub mod asset;
pub mod amount;
pub mod role;
pub mod error;
pub mod event;

pub use identity::*;
pub use asset::*;
pub use amount::*;
pub use role::*;
pub use error::*;
pub use event::*;
