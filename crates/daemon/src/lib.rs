#![forbid(unsafe_code)]

//! HTTP service for multi-provider trademark analyses.

pub mod api;
pub mod config;
pub mod db;
pub mod runs;
