pub mod ordering;

pub use ordering::{compare_versions, sort_newest_first, VersionKey, VersionRun};
