//! Build command implementation

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::config::{Config, Mode};
use crate::pipeline::Pipeline;
use crate::utils;

/// Build the project for production
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Output directory, overriding output.dir from skein.toml
    #[arg(short, long)]
    pub outdir: Option<String>,

    /// Skip minification
    #[arg(long)]
    pub no_minify: bool,

    /// Write plain filenames without content hashes
    #[arg(long)]
    pub no_hash: bool,
}

impl BuildCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        info!("loading configuration from {}", config_path);
        let mut config = Config::load(config_path)?;

        if let Some(outdir) = &self.outdir {
            config.output.dir = outdir.clone();
        }
        if self.no_minify {
            config.optimize.minify = false;
        }
        if self.no_hash {
            config.output.hash = false;
        }

        eprintln!("{} building {}...", "→".blue(), config.project.name.bold());

        let pipeline = Pipeline::new(Arc::new(config));
        let report = pipeline.build(Mode::Production).await?;

        eprintln!(
            "\n{} {} modules, {} files in {}\n",
            "✓".green().bold(),
            report.modules,
            report.summary.files.len(),
            utils::format_duration(report.duration)
        );

        for (name, size) in &report.summary.files {
            eprintln!(
                "  {} {} {}",
                "•".dimmed(),
                name.cyan(),
                utils::format_size(*size).dimmed()
            );
        }

        eprintln!(
            "\n  total {}\n",
            utils::format_size(report.summary.total_bytes()).bold()
        );

        Ok(())
    }
}
