use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use modswap::{
    commands,
    paths::Paths,
    strategy::LinkStrategy,
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "modswap")]
#[command(about = "Game profile switcher - swap mods/saves profiles via move, symlink, or junction")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all profiles
    List,

    /// Show the active profile and configuration
    Status,

    /// Create a new empty profile
    New {
        /// Name of the profile to create
        name: String,
    },

    /// Activate a profile (deactivates the current one first)
    Activate {
        /// Name of the profile to activate
        name: String,
    },

    /// Deactivate the currently active profile
    Deactivate,

    /// Rename a profile
    Rename {
        /// Current profile name
        old_name: String,

        /// New profile name
        new_name: String,
    },

    /// One-time setup: adopt the game's mods/saves into a default profile
    Init {
        /// The game's user-data directory (contains mods/ and saves/)
        user_data: PathBuf,

        /// Link strategy: move, symlink, junction (prompted when omitted)
        #[arg(long)]
        strategy: Option<LinkStrategy>,

        /// Show the planned operations without performing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Watch the profiles root and keep the registry in sync
    Watch,

    /// Run diagnostics on the modswap setup
    Doctor,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = Paths::new()?;
    let ui = Ui::new(cli.color, cli.no_color);

    match cli.command {
        Commands::List => commands::list(&paths, &ui),
        Commands::Status => commands::status(&paths, &ui),
        Commands::New { name } => commands::new_profile(&paths, &name, &ui),
        Commands::Activate { name } => commands::activate(&paths, &name, &ui),
        Commands::Deactivate => commands::deactivate(&paths, &ui),
        Commands::Rename { old_name, new_name } => {
            commands::rename(&paths, &old_name, &new_name, &ui)
        }
        Commands::Init {
            user_data,
            strategy,
            dry_run,
        } => commands::init(&paths, &user_data, strategy, dry_run, &ui),
        Commands::Watch => commands::watch(&paths, &ui),
        Commands::Doctor => commands::doctor(&paths, &ui),
    }
}
