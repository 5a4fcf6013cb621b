pub mod event;
pub mod location;
pub mod package;
pub mod pipeline;

pub use event::{AgentRef, ProvenanceEvent};
pub use location::{AccessProtocol, Location, LocationPurpose, Space, SpaceConfig};
pub use package::{Compression, Package, PackageStatus, PackageType, TieredAttributes};
pub use pipeline::Pipeline;
