//! Source-side collaborators: architecture configs and the reference forward.

mod architecture;
mod reference;

pub use architecture::{ArchitectureProvider, ElectraPresets, JsonArchitecture, StaticArchitecture};
pub use reference::TfElectraReference;
