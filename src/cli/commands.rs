//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use tracing::{info, warn};

use crate::chain::Chain;
use crate::config::Config;
use crate::error::Error;
use crate::inputs::{read_label_map, read_team_file};
use crate::pipeline::{AttributionPipeline, AttributionRequest};
use crate::provider::{
    CovalentClient, EthplorerClient, ExplorerClient, ProviderMode, ProviderRouter, RetryPolicy, RouterLimits,
    TokenDataProvider,
};
use crate::report::{default_file_name, render_summary, wallets_csv_path, write_json, write_wallets_csv};
use crate::types::Address;

/// Arguments of the `export` command
#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Target network: ethereum, polygon, bsc, arbitrum, optimism
    #[arg(long)]
    pub chain: String,

    /// Token contract address
    #[arg(long)]
    pub token: String,

    /// Holder and metadata source: auto, covalent or ethplorer (creation and
    /// transfers always use the auto order)
    #[arg(long, default_value = "auto")]
    pub provider: String,

    /// Number of top holders to fetch
    #[arg(long)]
    pub top: Option<u32>,

    /// Hours after contract creation treated as the initial distribution window
    #[arg(long)]
    pub hours: Option<u32>,

    /// Newline-delimited list of known team addresses
    #[arg(long)]
    pub team_file: Option<PathBuf>,

    /// CSV with columns address,label
    #[arg(long)]
    pub label_map: Option<PathBuf>,

    /// Output JSON path (default: team_holdings_<chain>_<token>_<date>.json)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Include the early transfer table for auditability
    #[arg(long)]
    pub include_transfers: bool,
}

/// Register every backend that has usable credentials
pub fn build_router(config: &Config, mode: ProviderMode) -> crate::error::Result<ProviderRouter> {
    let p = &config.providers;
    let timeout = Duration::from_secs(p.request_timeout_secs);
    let mut providers: Vec<Arc<dyn TokenDataProvider>> = Vec::new();

    match p.covalent_key() {
        Some(key) => providers.push(Arc::new(CovalentClient::new(key, timeout, p.covalent_page_size)?)),
        None => info!("COVALENT_API_KEY not set, Covalent disabled"),
    }

    providers.push(Arc::new(EthplorerClient::new(
        p.ethplorer_key(),
        timeout,
        p.ethplorer_max_holders,
    )?));

    let explorer_keys = p.explorer_keys();
    if explorer_keys.is_empty() {
        info!("No explorer API keys set, explorer disabled");
    } else {
        providers.push(Arc::new(ExplorerClient::new(explorer_keys, timeout, p.explorer_page_size)?));
    }

    Ok(ProviderRouter::new(
        mode,
        providers,
        RetryPolicy::from_config(&config.retry),
        RouterLimits {
            max_holder_pages: config.analysis.max_holder_pages,
            max_transfer_pages: config.analysis.max_transfer_pages,
        },
    ))
}

/// Build the attribution request from CLI arguments and config defaults
pub fn build_request(config: &Config, args: &ExportArgs) -> crate::error::Result<AttributionRequest> {
    let chain: Chain = args.chain.parse()?;
    let token = Address::parse(&args.token)?;
    let top = args.top.unwrap_or(config.analysis.default_top);
    if top == 0 {
        return Err(Error::Config("--top must be at least 1".to_string()));
    }
    let hours = args.hours.unwrap_or(config.analysis.default_window_hours);

    let mut request = AttributionRequest::new(chain, token, top, hours);
    request.include_transfers = args.include_transfers;

    if let Some(path) = &args.team_file {
        request.known_team = read_team_file(path)?;
        request.known_team_source = Some(path.display().to_string());
    }
    if let Some(path) = &args.label_map {
        request.labels = read_label_map(path)?;
        request.label_map_source = Some(path.display().to_string());
    }
    Ok(request)
}

/// Run the pipeline and write the report files
pub async fn export(config: &Config, args: &ExportArgs) -> Result<()> {
    let mode: ProviderMode = args.provider.parse()?;
    let request = build_request(config, args)?;
    let router = build_router(config, mode)?;

    let bundle = AttributionPipeline::new(&router).run(&request).await?;

    let json_path = match &args.out {
        Some(path) => path.clone(),
        None => Path::new(&config.output.directory).join(default_file_name(
            request.chain,
            &request.token,
            Utc::now(),
        )),
    };
    if let Some(dir) = json_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    write_json(&bundle, &json_path)?;
    let csv_path = wallets_csv_path(&json_path);
    write_wallets_csv(&bundle.wallets, &csv_path)?;

    println!("\n{}", render_summary(&bundle));
    if bundle.methodology.snapshot_truncated {
        warn!("Holder snapshot is partial; team share is relative to the sampled holders only");
    }
    println!("Saved: {}", json_path.display());
    println!("Saved: {}", csv_path.display());
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
