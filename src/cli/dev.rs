//! Development server command implementation

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::config::Config;
use crate::server::DevServer;

/// Start the development server
#[derive(Args, Debug)]
pub struct DevCommand {
    /// Port to run the dev server on, overriding dev.port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to, overriding dev.host
    #[arg(long)]
    pub host: Option<String>,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,
}

impl DevCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        info!("loading configuration from {}", config_path);
        let mut config = Config::load(config_path)?;

        if let Some(port) = self.port {
            config.dev.port = port;
        }
        if let Some(host) = &self.host {
            config.dev.host = host.clone();
        }
        if self.open {
            config.dev.open = true;
        }

        eprintln!(
            "{} starting dev server for {}",
            "→".blue(),
            config.project.name.bold()
        );
        eprintln!("  {} press {} to stop\n", "•".dimmed(), "Ctrl+C".yellow());

        let server = DevServer::new(Arc::new(config));
        server.run().await
    }
}
