//! # Cascade Testkit
//!
//! Test utilities for Cascade.
//!
//! This crate provides:
//! - A ready-made shop schema (customers, orders, order lines and order
//!   attributes) on a [`MemoryConnection`](cascade_store::MemoryConnection)
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use cascade_testkit::prelude::*;
//!
//! let shop = Shop::new();
//! let mut order = shop.new_entity(ORDER).unwrap();
//! order.set("note", "rush").unwrap();
//! assert!(order.save_all().unwrap());
//! assert_eq!(shop.conn.rows("orders").len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
