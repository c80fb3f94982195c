pub mod model;
pub mod store;

pub use model::{parse_launch_options, GameEntry, GameOverrides, RunnerKind};
pub use store::GameStore;
