//! Credential file loading.

use anyhow::{bail, Context};
use herald_core::Credential;
use std::path::Path;

/// Split newline- or comma-separated secrets, ignoring blank entries.
pub fn parse_credentials(raw: &str) -> Vec<Credential> {
    raw.split(['\n', ','])
        .map(str::trim)
        .filter(|secret| !secret.is_empty())
        .map(Credential::new)
        .collect()
}

/// Load credentials from `path`. A missing or empty file is fatal.
pub fn load_credentials(path: &Path) -> anyhow::Result<Vec<Credential>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read credentials from {}", path.display()))?;
    let credentials = parse_credentials(&raw);
    if credentials.is_empty() {
        bail!("no credentials found in {}", path.display());
    }
    Ok(credentials)
}
