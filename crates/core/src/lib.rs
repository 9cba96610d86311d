#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and logic for the trademark opinion panel.

pub mod api;
pub mod case_number;
pub mod deadline;
pub mod documents;
pub mod model;
pub mod validation;

mod util;

pub use util::{new_ulid, now_ms, EpochMs};
