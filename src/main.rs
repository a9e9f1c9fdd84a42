// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use clap::Parser;
use netdisk_search::cli::{execute, Cli};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays machine-readable
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = execute(cli).await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}
