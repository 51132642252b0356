//! Deployment module

pub mod bash;
pub mod command;
pub mod deployer;
pub mod executor;
pub mod helm;
pub mod lifecycle;
pub mod locks;
pub mod staging;
pub mod terraform;
