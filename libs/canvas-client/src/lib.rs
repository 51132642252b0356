//! Canvas API models shared by the provisioner and its tests.

pub mod models;

pub use models::{DeployStatus, PackageStatusUpdate};
