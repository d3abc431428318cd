//! Core vocabulary for the scorenet incremental constraint network.
//!
//! This crate holds the types shared by every node of the network:
//! the error enum, the [`Fact`] trait for problem facts, and the
//! [`IndexKey`]/[`KeyPart`] types used for join indexing and grouping.

pub mod error;
pub mod fact;
pub mod key;

pub use error::{Result, ScorenetError};
pub use fact::{Fact, FactHandle};
pub use key::{IndexKey, KeyPart};
