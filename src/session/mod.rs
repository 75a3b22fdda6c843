//! The session substrate: durable descriptors, the sidecar launcher, the
//! per-session worker loop and the registry tying them together.

pub mod descriptor;
pub mod launcher;
pub mod registry;
pub mod runner;
pub mod worker;

pub use descriptor::{DescriptorStore, SessionDescriptor};
pub use registry::SessionManager;
