pub mod download;
pub mod extract;
pub mod installer;
pub mod model;
pub mod registry;
pub mod releases;
pub mod updates;

pub use installer::{ArchiveInstaller, ArchiveSource};
pub use model::{
    no_progress, InstallPhase, InstallProgress, ProgressFn, ReleaseDescriptor, RuntimeChannel,
    RuntimePackage,
};
pub use registry::RuntimeRegistry;
pub use releases::{GithubReleaseSource, ReleaseResolver, ReleaseSource, RetryPolicy};
pub use updates::{AvailableUpdate, UpdateChecker};
