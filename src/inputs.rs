//! User-supplied address lists

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::Address;

/// Read a newline-delimited known-team file
///
/// Blank lines and `#` comments are skipped. Entries that are not
/// well-formed addresses are kept (lowercased) but logged.
pub fn read_team_file<P: AsRef<Path>>(path: P) -> Result<BTreeSet<Address>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Input(format!("cannot read team file {}: {}", path.display(), e)))?;
    let addresses = parse_team_list(&content);
    debug!("Loaded {} known team addresses from {}", addresses.len(), path.display());
    Ok(addresses)
}

pub fn parse_team_list(content: &str) -> BTreeSet<Address> {
    let mut addresses = BTreeSet::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let address = Address::new(line);
        if !address.is_well_formed() {
            warn!("Team file line {}: '{}' is not a 20-byte hex address", idx + 1, line);
        }
        addresses.insert(address);
    }
    addresses
}

/// Read an `address,label` CSV; the last row for an address wins
///
/// A missing file yields an empty map.
pub fn read_label_map<P: AsRef<Path>>(path: P) -> Result<BTreeMap<Address, String>> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("Label map {} not found, continuing without labels", path.display());
        return Ok(BTreeMap::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let address_col = column("address")
        .ok_or_else(|| Error::Input(format!("{}: missing 'address' column", path.display())))?;
    let label_col = column("label");

    let mut labels = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        let address = match record.get(address_col) {
            Some(a) if !a.is_empty() => Address::new(a),
            _ => continue,
        };
        let label = label_col
            .and_then(|i| record.get(i))
            .unwrap_or_default()
            .to_string();
        labels.insert(address, label);
    }
    debug!("Loaded {} labels from {}", labels.len(), path.display());
    Ok(labels)
}
