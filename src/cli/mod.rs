// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod search;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Share-link search CLI
#[derive(Parser, Debug)]
#[command(name = "netdisk-search")]
#[command(version = "0.1.0")]
#[command(about = "Search configured sources for cloud-storage share links", long_about = None)]
pub struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log level selected by the verbosity flag
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search all configured sources for a keyword
    Search(search::SearchArgs),

    /// List the sources registered in a sources file
    Sources(search::SourcesArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Search(args) => search::run_search(args).await,
        Commands::Sources(args) => search::list_sources(args),
    }
}
