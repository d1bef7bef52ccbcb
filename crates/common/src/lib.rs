//! Types shared across the cooperative portal client crates
//!
//! `Secret` keeps tokens and key bytes out of logs; `Error` covers the
//! configuration failures the host binary reports at startup.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
