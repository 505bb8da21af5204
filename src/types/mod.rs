//! Shared types

pub mod error;

pub use error::{HeraldError, PushFailure, Result};
