//! Background workers

pub mod deployer;
pub mod outcomes;
