#![forbid(unsafe_code)]

//! Collects recent long-form YouTube uploads into a deduplicated content table
//! and serves that table to a small viewer.

pub mod collector;
pub mod config;
pub mod duration;
pub mod logging;
pub mod store;
pub mod youtube;
