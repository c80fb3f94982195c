//! Hacker Launcher command line front end.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use hacker_launcher_lib::commands;
use hacker_launcher_lib::core::error::{LauncherError, LauncherResult};
use hacker_launcher_lib::core::game::{parse_launch_options, GameEntry};
use hacker_launcher_lib::core::paths::LauncherPaths;
use hacker_launcher_lib::core::runtime::{InstallProgress, ProgressFn, RuntimeChannel};
use hacker_launcher_lib::core::state::AppState;
use hacker_launcher_lib::init_logging;

/// Manage Proton runtimes and launch games.
#[derive(Parser, Debug)]
#[command(name = "hacker-launcher", author, version)]
struct Cli {
    /// Launcher home (defaults to ~/.hackeros/Hacker-Launcher)
    #[arg(long, global = true, env = "HACKER_LAUNCHER_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Installed and available Proton runtimes
    #[command(subcommand)]
    Runtimes(RuntimeCommand),

    /// Game library
    #[command(subcommand)]
    Games(GameCommand),
}

#[derive(Subcommand, Debug)]
enum RuntimeCommand {
    /// List installed runtimes
    List,
    /// List releases of a channel
    Available {
        #[arg(default_value = "ge")]
        channel: RuntimeChannel,
    },
    /// Download and install a release
    Install { channel: RuntimeChannel, tag: String },
    /// Install a local .tar.gz or .zip
    InstallArchive {
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// Copy an unpacked runtime folder
    InstallFolder {
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove an installed runtime
    Remove { identifier: String },
    /// Check one runtime for a newer release
    CheckUpdate { identifier: String },
}

#[derive(Subcommand, Debug)]
enum GameCommand {
    /// List stored games
    List,
    /// Add a game
    Add {
        name: String,
        /// Executable path, or the app id for Steam and Flatpak
        executable: String,
        /// native, wine, proton, flatpak or steam (defaults to the configured runner)
        #[arg(long)]
        runner: Option<String>,
        /// Installed runtime to use with --runner proton
        #[arg(long)]
        proton: Option<String>,
        #[arg(long)]
        prefix: Option<PathBuf>,
        /// Launch options, e.g. "--gamescope --fullscreen -dx11"
        #[arg(long, allow_hyphen_values = true)]
        options: Option<String>,
        #[arg(long)]
        fps_limit: Option<u32>,
    },
    /// Remove a game
    Remove { name: String },
    /// Launch a game and wait for it to exit
    Launch {
        name: String,
        /// Return right after spawning
        #[arg(long)]
        detach: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let paths = match cli.home {
        Some(home) => LauncherPaths::from_base(home),
        None => LauncherPaths::from_env(),
    };

    if let Err(e) = init_logging(&paths.logs_dir()) {
        eprintln!("Error: {e}");
    }

    if let Err(e) = run(paths, cli.command).await {
        tracing::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(paths: LauncherPaths, command: Commands) -> LauncherResult<()> {
    let state = AppState::new(paths)?;
    match command {
        Commands::Runtimes(command) => run_runtime_command(&state, command).await,
        Commands::Games(command) => run_game_command(&state, command).await,
    }
}

async fn run_runtime_command(state: &AppState, command: RuntimeCommand) -> LauncherResult<()> {
    match command {
        RuntimeCommand::List => {
            for runtime in commands::installed_runtimes(state).await? {
                println!(
                    "{:<32} {:<13} {}",
                    runtime.identifier,
                    runtime.channel,
                    runtime.status()
                );
            }
        }
        RuntimeCommand::Available { channel } => {
            let releases = commands::available_runtimes(state, channel).await?;
            if releases.is_empty() {
                println!("No releases available for {channel}");
            }
            for release in releases {
                println!("{}", release.tag);
            }
        }
        RuntimeCommand::Install { channel, tag } => {
            let package = commands::install_release(
                state,
                channel,
                &tag,
                progress_printer(),
                cancel_on_ctrl_c(),
            )
            .await?;
            println!("\nInstalled {} at {}", package.identifier, package.root.display());
        }
        RuntimeCommand::InstallArchive { path, name } => {
            let package = commands::install_custom_archive(
                state,
                &path,
                name.as_deref(),
                progress_printer(),
                cancel_on_ctrl_c(),
            )
            .await?;
            println!("\nInstalled {} at {}", package.identifier, package.root.display());
        }
        RuntimeCommand::InstallFolder { path, name } => {
            let package = commands::install_custom_folder(state, &path, name.as_deref()).await?;
            println!("Installed {} at {}", package.identifier, package.root.display());
        }
        RuntimeCommand::Remove { identifier } => {
            if commands::remove_runtime(state, &identifier).await? {
                println!("Removed {identifier}");
            } else {
                println!("{identifier} is not installed");
            }
        }
        RuntimeCommand::CheckUpdate { identifier } => {
            match commands::check_runtime_update(state, &identifier).await? {
                Some(update) => println!("Update available: {}", update.version),
                None => println!("{identifier} is up to date"),
            }
        }
    }
    Ok(())
}

async fn run_game_command(state: &AppState, command: GameCommand) -> LauncherResult<()> {
    match command {
        GameCommand::List => {
            for game in commands::list_games(state).await? {
                println!("{:<32} {}", game.name, game.runner);
            }
        }
        GameCommand::Add {
            name,
            executable,
            runner,
            proton,
            prefix,
            options,
            fps_limit,
        } => {
            let runner =
                commands::resolve_runner(state, &name, runner.as_deref(), proton.as_deref()).await?;

            let mut game = GameEntry::new(name, executable, runner);
            game.prefix = prefix;
            game.launch_options = options.as_deref().map(parse_launch_options).unwrap_or_default();
            game.fps_limit = fps_limit;

            let game = commands::add_game(state, game).await?;
            println!("Added {}", game.name);
        }
        GameCommand::Remove { name } => {
            if commands::remove_game(state, &name).await? {
                println!("Removed {name}");
            } else {
                println!("No game named {name}");
            }
        }
        GameCommand::Launch { name, detach } => {
            let mut process = commands::launch_game(state, &name).await?;
            println!("Started {name} (pid {}), log: {}", process.pid, process.log_path.display());
            if !detach {
                let code = tokio::task::spawn_blocking(move || process.wait())
                    .await
                    .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))??;
                println!("{name} exited with {code:?}");
            }
        }
    }
    Ok(())
}

fn progress_printer() -> ProgressFn {
    Arc::new(|progress: InstallProgress| {
        eprint!(
            "\r{:?}: {:>5.1}%",
            progress.phase,
            progress.fraction() * 100.0
        );
    })
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            token.cancel();
        }
    });
    cancel
}
