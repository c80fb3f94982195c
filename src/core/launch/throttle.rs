use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};

pub const LAUNCH_COOLDOWN: Duration = Duration::from_secs(60);

/// Refuses to relaunch the same game within the cooldown window.
#[derive(Debug)]
pub struct LaunchThrottle {
    cooldown: Duration,
    last_launch: Mutex<HashMap<String, Instant>>,
}

impl Default for LaunchThrottle {
    fn default() -> Self {
        Self::new(LAUNCH_COOLDOWN)
    }
}

impl LaunchThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_launch: Mutex::new(HashMap::new()),
        }
    }

    /// Record a launch of `game`, or fail with the whole seconds left.
    pub fn check_and_record(&self, game: &str) -> LauncherResult<()> {
        let mut last_launch = self
            .last_launch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();

        if let Some(previous) = last_launch.get(game) {
            let elapsed = now.duration_since(*previous);
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                let remaining_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                info!("Launch blocked for {} due to cooldown: {}s", game, remaining_secs);
                return Err(LauncherError::LaunchCooldown {
                    game: game.to_string(),
                    remaining_secs,
                });
            }
        }

        last_launch.insert(game.to_string(), now);
        Ok(())
    }

    /// Forget a recorded launch, used when the launch failed after all.
    pub fn forget(&self, game: &str) {
        self.last_launch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(game);
    }
}
