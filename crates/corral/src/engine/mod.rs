//! Sandbox engines shipped with corral.

mod bundle;
mod local;

pub use bundle::ProcessConfig;
pub use local::LocalEngine;
