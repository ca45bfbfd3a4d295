//! Report bundle, partial-data warnings and file writers

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::amount::u256_decimal;
use crate::chain::Chain;
use crate::error::Result;
use crate::pipeline::aggregator::{CategoryTotal, CategoryTotals, WalletRow};
use crate::provider::{Capability, ProviderKind};
use crate::types::{Address, TimeWindow, TransferEvent};

pub const HEURISTIC_RULE: &str = "Addresses that received tokens from the contract creator or from the token \
contract within the first N hours after creation are flagged as inferred team. The creator and the \
contract itself are flagged as team when they hold tokens. Addresses from the known-team list are flagged \
as known team.";

pub const CAVEATS: &str = "Results are estimates based on the available holder sample and heuristics, not \
proof of ownership; manual review recommended.";

/// Non-fatal data gaps recorded in the methodology
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartialDataWarning {
    HolderSnapshotTruncated {
        provider: ProviderKind,
        returned: usize,
        requested: u32,
    },
    CreationInfoUnavailable { reason: String },
    TransfersUnavailable { reason: String },
    TransfersTruncated { provider: ProviderKind, fetched: usize },
    TransferWindowEmpty { hours: u32 },
    BalanceExceedsSupply { address: Address, balance: String },
}

impl fmt::Display for PartialDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialDataWarning::HolderSnapshotTruncated {
                provider,
                returned,
                requested,
            } => write!(
                f,
                "holder snapshot truncated: {} returned {} of {} requested holders",
                provider, returned, requested
            ),
            PartialDataWarning::CreationInfoUnavailable { reason } => {
                write!(f, "contract creation info unavailable ({}); only the known list was applied", reason)
            }
            PartialDataWarning::TransfersUnavailable { reason } => {
                write!(f, "early transfers unavailable ({}); transfer heuristics skipped", reason)
            }
            PartialDataWarning::TransfersTruncated { provider, fetched } => write!(
                f,
                "early transfers truncated: {} stopped paging after {} events; later receivers may be missed",
                provider, fetched
            ),
            PartialDataWarning::TransferWindowEmpty { hours } => {
                write!(f, "no transfers in the {}h window after creation", hours)
            }
            PartialDataWarning::BalanceExceedsSupply { address, balance } => {
                write!(f, "{} balance {} exceeds total supply; share clamped to 100%", address, balance)
            }
        }
    }
}

/// How the estimate was produced
#[derive(Debug, Clone, Serialize)]
pub struct Methodology {
    pub chain: Chain,
    pub token: Address,
    pub token_name: String,
    pub token_symbol: String,
    pub decimals: u8,
    #[serde(serialize_with = "u256_decimal::serialize")]
    pub total_supply: U256,
    pub total_supply_tokens: String,
    pub provider_mode: String,
    /// Provider that served each capability
    pub providers: BTreeMap<Capability, ProviderKind>,
    pub holder_target: u32,
    pub holders_returned: usize,
    pub snapshot_truncated: bool,
    pub window_hours: u32,
    pub window: Option<TimeWindow>,
    pub creator: Option<Address>,
    pub creation_time: Option<DateTime<Utc>>,
    pub known_team_source: Option<String>,
    pub label_map_source: Option<String>,
    pub heuristic_rule: String,
    pub caveats: String,
    pub warnings: Vec<PartialDataWarning>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportBundle {
    pub methodology: Methodology,
    pub totals: CategoryTotals,
    pub wallets: Vec<WalletRow>,
    /// Only when early transfers were requested for audit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_transfers: Option<Vec<TransferEvent>>,
}

impl ReportBundle {
    pub fn warnings(&self) -> &[PartialDataWarning] {
        &self.methodology.warnings
    }
}

/// `team_holdings_<chain>_<token6>_<YYYYmmdd_HHMM>.json`
pub fn default_file_name(chain: Chain, token: &Address, at: DateTime<Utc>) -> String {
    format!(
        "team_holdings_{}_{}_{}.json",
        chain,
        token.short(),
        at.format("%Y%m%d_%H%M")
    )
}

/// Sibling CSV path for the wallet table
pub fn wallets_csv_path(json_path: &Path) -> PathBuf {
    json_path.with_extension("wallets.csv")
}

pub fn write_json(bundle: &ReportBundle, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, bundle)?;
    info!("Saved report: {}", path.display());
    Ok(())
}

pub fn write_wallets_csv(rows: &[WalletRow], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "address",
        "label",
        "is_known_team",
        "is_inferred_team",
        "is_team",
        "balance_raw",
        "balance_tokens",
        "pct_total_supply",
        "in_holder_snapshot",
        "reasons",
    ])?;

    for row in rows {
        let reasons: Vec<String> = row.reasons.iter().map(|r| r.to_string()).collect();
        writer.write_record([
            row.address.to_string(),
            row.label.clone().unwrap_or_default(),
            row.is_known_team.to_string(),
            row.is_inferred_team.to_string(),
            row.is_team.to_string(),
            row.balance.to_string(),
            row.balance_tokens.clone(),
            format!("{}%", row.share.to_percent_string(4)),
            row.in_holder_snapshot.to_string(),
            reasons.join("; "),
        ])?;
    }
    writer.flush()?;
    info!("Saved wallets: {}", path.display());
    Ok(())
}

/// Console summary of categories and warnings
pub fn render_summary(bundle: &ReportBundle) -> String {
    let m = &bundle.methodology;
    let t = &bundle.totals;
    let line = |name: &str, total: &CategoryTotal| {
        format!(
            "  {:<30} {:>6} wallets  {:>28} {}  {:>9}%\n",
            name,
            total.wallets,
            total.balance_tokens,
            m.token_symbol,
            total.share.to_percent_string(4)
        )
    };

    let mut out = format!(
        "{} ({}) on {}\n  total supply {} {}, {} holders sampled\n",
        m.token_name, m.token, m.chain, m.total_supply_tokens, m.token_symbol, m.holders_returned
    );
    out.push_str(&line("Known team (provided)", &t.known));
    out.push_str(&line("Inferred team (heuristics)", &t.inferred));
    out.push_str(&line("All team (union)", &t.all_team));
    out.push_str(&line("Non-team (others in sample)", &t.other));

    if !m.warnings.is_empty() {
        out.push_str("Warnings:\n");
        for warning in &m.warnings {
            out.push_str(&format!("  - {}\n", warning));
        }
    }
    out
}
