/// Dogu descriptors (dogu.json) and qualified names.
pub mod descriptor;

/// The Dogu custom resource.
pub mod resource;

/// Dogu version scheme.
pub mod version;

pub use descriptor::{Dependency, DependencyType, DoguDescriptor, ExposedCommand, QualifiedName};
pub use resource::{Dogu, DoguSpec, DoguStatus, DoguUpgradeConfig};
pub use version::Version;
