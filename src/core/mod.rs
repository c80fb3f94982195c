// ─── Hacker Launcher Core ───
// Proton runtime management and game launching.
//
// Architecture:
//   core/
//     paths        Launcher home layout
//     http         Shared reqwest client
//     version/     Version ordering for runtime tags
//     runtime/     Release lookup, download, extraction, installed registry
//     game/        Game library model + games.json store
//     launch/      Launch plan builder, gamescope wrapper, process spawner
//     state/       Settings + application state

pub mod error;
pub mod game;
pub mod http;
pub mod launch;
pub mod paths;
pub mod runtime;
pub mod state;
pub mod version;
