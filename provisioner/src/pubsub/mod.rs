//! Push subscription intake

pub mod envelope;
pub mod subscriber;
