//! Provisioner Library
//!
//! Turns deployment requests pushed by a message broker into Terraform,
//! OpenTofu, Helm or Bash runs and reports their status to the Canvas API.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod pubsub;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
