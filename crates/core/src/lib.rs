//! Tienda Core - Shared types and order workflow rules.
//!
//! This crate is used by:
//! - `admin` - The back-office server (products, orders, shipments, payments)
//! - `cli` - Command-line management tools
//!
//! # Architecture
//!
//! The core crate contains only types and pure decision logic - no file
//! access, no HTTP clients. The admin crate loads orders from JSON, asks
//! [`workflow`] what a status change means, and applies the answer.
//!
//! # Modules
//!
//! - [`types`] - IDs, prices, emails and status enums
//! - [`workflow`] - Order status transitions, stock and notification rules

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;
pub mod workflow;

pub use types::*;
pub use workflow::{
    OrderSnapshot, StockAction, TransitionError, TransitionPlan, plan_manual_transition,
    plan_other_attempt, plan_payment_update,
};
