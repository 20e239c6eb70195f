//! Command-line interface
//!
//! Two subcommands: `build` runs a one-shot production build, `dev`
//! starts the development server.

mod build;
mod dev;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use build::BuildCommand;
pub use dev::DevCommand;

/// Skein - a frontend asset build pipeline
#[derive(Parser, Debug)]
#[command(name = "skein")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to skein.toml config file
    #[arg(short, long, global = true, default_value = "skein.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project for production
    Build(BuildCommand),

    /// Start the development server
    Dev(DevCommand),
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Build(cmd) => cmd.execute(&self.config).await,
            Commands::Dev(cmd) => cmd.execute(&self.config).await,
        }
    }
}

fn print_banner() {
    eprintln!(
        "\n{} {}\n",
        "skein".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
