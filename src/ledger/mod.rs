//! Share holdings ledger
//!
//! A team's holdings are a mapping `company -> count` that must never hold a
//! negative count. Every change to the holdings, forward or reversed, goes
//! through [`TeamShares::merge_changes`].

mod shares;

pub use shares::{negated, ShareChanges, TeamShares};
