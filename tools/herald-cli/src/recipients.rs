//! Persisted recipient list: one decimal identifier per line.

use anyhow::Context;
use herald_core::{dedup_preserving_order, TargetId};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RecipientStore {
    path: PathBuf,
}

impl RecipientStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recipients in first-seen order. A missing file is an empty list;
    /// lines that are not decimal identifiers are skipped.
    pub fn load(&self) -> anyhow::Result<Vec<TargetId>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read recipients from {}", self.path.display()))?;
        Ok(parse_recipients(&raw))
    }

    /// Merge `recipients` into the persisted set and rewrite it sorted.
    /// Returns the size of the merged set.
    pub fn save(&self, recipients: &[TargetId]) -> anyhow::Result<usize> {
        let mut merged: BTreeSet<TargetId> = self.load()?.into_iter().collect();
        merged.extend(recipients.iter().copied());

        let mut contents = String::new();
        for recipient in &merged {
            contents.push_str(&recipient.to_string());
            contents.push('\n');
        }
        std::fs::write(&self.path, contents)
            .with_context(|| format!("failed to write recipients to {}", self.path.display()))?;

        info!(path = %self.path.display(), added = recipients.len(), total = merged.len(), "recipients saved");
        Ok(merged.len())
    }
}

fn parse_recipients(raw: &str) -> Vec<TargetId> {
    let parsed = raw
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| match line.parse::<TargetId>() {
            Ok(target) => Some(target),
            Err(_) => {
                warn!(line = index + 1, content = line, "skipping non-numeric recipient");
                None
            }
        });
    dedup_preserving_order(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[u64]) -> Vec<TargetId> {
        values.iter().copied().map(TargetId).collect()
    }

    #[test]
    fn test_load_skips_junk_and_duplicates() {
        assert_eq!(
            parse_recipients("30\n10\nnot-a-number\n\n30\n 20 \n12abc\n"),
            ids(&[30, 10, 20])
        );
    }

    #[test]
    fn test_save_is_a_sorted_union() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecipientStore::new(dir.path().join("recipients.txt"));

        assert_eq!(store.save(&ids(&[1, 2, 3])).unwrap(), 3);
        assert_eq!(store.save(&ids(&[2, 3, 4])).unwrap(), 4);

        assert_eq!(store.load().unwrap(), ids(&[1, 2, 3, 4]));
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "1\n2\n3\n4\n"
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecipientStore::new(dir.path().join("absent.txt"));
        assert!(store.load().unwrap().is_empty());
    }
}
