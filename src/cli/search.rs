// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::search::{
    Fetcher, LinkOrigin, ProviderType, SearchConfig, SearchOptions, SearchOrchestrator,
    SearchResponse, SourcesFile,
};

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Keyword to search for
    pub keyword: String,

    /// Sources file (TOML)
    #[arg(long, env = "NETDISK_SOURCES")]
    pub sources: PathBuf,

    /// Pages fetched per source
    #[arg(long)]
    pub pages: Option<usize>,

    /// Only report these providers (comma-separated)
    #[arg(long = "provider", value_delimiter = ',')]
    pub providers: Vec<ProviderType>,

    /// Never report these providers (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<ProviderType>,

    /// Only query these sources (comma-separated names)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Print the response as JSON
    #[arg(long)]
    pub json: bool,

    /// Ignore cached results
    #[arg(long)]
    pub refresh: bool,
}

/// Arguments for the sources command
#[derive(Args, Debug)]
pub struct SourcesArgs {
    /// Sources file (TOML)
    #[arg(long, env = "NETDISK_SOURCES")]
    pub sources: PathBuf,
}

impl SearchArgs {
    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            max_pages: self.pages,
            enabled_providers: (!self.providers.is_empty()).then(|| self.providers.clone()),
            disabled_providers: self.exclude.clone(),
            sources: (!self.only.is_empty()).then(|| self.only.clone()),
            force_refresh: self.refresh,
        }
    }
}

/// Run one search and print the response
pub async fn run_search(args: SearchArgs) -> Result<()> {
    let config = SearchConfig::from_env();
    config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    let file = SourcesFile::from_file(&args.sources)
        .with_context(|| format!("loading {}", args.sources.display()))?;
    let patterns = file.pattern_table()?;
    let registry = file.registry()?;
    if registry.is_empty() {
        return Err(anyhow!(
            "No enabled sources in {}",
            args.sources.display()
        ));
    }
    for unknown in registry.unknown_sources(&args.options()) {
        warn!("Unknown source '{}' ignored", unknown);
    }

    let fetcher = Fetcher::from_config(&config.fetch)?;
    let orchestrator = SearchOrchestrator::new(config, fetcher, patterns, registry);
    info!("Searching {} sources for '{}'", orchestrator.sources().len(), args.keyword);

    // The limiter only adapts while the adjuster runs
    let background = orchestrator.spawn_background_tasks();
    let response = orchestrator.search(&args.keyword, args.options()).await;
    background.abort();
    debug!("Final concurrency limit: {}", orchestrator.limiter_snapshot().limit);
    let response = response?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", render_response(&response));
    }
    Ok(())
}

/// List registered sources in priority order
pub fn list_sources(args: SourcesArgs) -> Result<()> {
    let file = SourcesFile::from_file(&args.sources)
        .with_context(|| format!("loading {}", args.sources.display()))?;
    let registry = file.registry()?;

    println!("📋 {} sources in {}", registry.len(), args.sources.display());
    for adapter in registry.adapters() {
        println!("   [{:>3}] {}", adapter.priority(), adapter.name());
    }
    let disabled = file.sources.iter().filter(|s| !s.enabled).count();
    if disabled > 0 {
        println!("   ({} disabled)", disabled);
    }
    Ok(())
}

/// Human-readable rendering of a response
pub fn render_response(response: &SearchResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "🔍 {} results for '{}' in {}ms{}{}",
        response.total,
        response.keyword,
        response.elapsed_ms,
        if response.cached { " (cached)" } else { "" },
        if response.timed_out { " (timed out)" } else { "" },
    );

    for result in &response.results {
        let _ = writeln!(out, "\n📦 {} [{}]", result.title, result.id);
        for link in &result.links {
            let password = match (&link.password, link.origin) {
                (Some(p), LinkOrigin::Inline) => format!(" (code {}, inline)", p),
                (Some(p), _) => format!(" (code {})", p),
                (None, _) => String::new(),
            };
            let _ = writeln!(out, "   {:<7} {}{}", link.provider_type.as_str(), link.url, password);
        }
    }

    if !response.failures.is_empty() {
        let _ = writeln!(out, "\n⚠️  {} tasks failed", response.failures.len());
        for failure in &response.failures {
            let _ = writeln!(out, "   {}: {}", failure.target, failure.cause);
        }
    }
    out
}
