pub mod plan;
pub mod task;
pub mod throttle;
pub mod wrapper;

pub use plan::{
    BinaryLocator, CompatDefaults, LaunchContext, LaunchEnvironmentBuilder, LaunchPlan,
    SystemLocator,
};
pub use task::{LaunchedProcess, ProcessLauncher};
pub use throttle::LaunchThrottle;
