//! Canvas API access

pub mod client;
pub mod status;
