//! File-backed allowlist of identities eligible for auto-reply.
//!
//! The backing file is a small JSON document; every successful mutation
//! is persisted before it is acknowledged (write-through), and the file
//! is replaced atomically (temp file + rename) so a reader can never
//! observe a partial write.

use crate::identity::{normalize, CanonicalIdentity};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Serialize, Deserialize)]
struct AllowlistFile {
    phone_numbers: Vec<String>,
    #[serde(default = "default_description")]
    description: String,
    #[serde(default = "default_note")]
    note: String,
}

fn default_description() -> String {
    "Numbers that should receive automated responses while Do Not Disturb is on".to_string()
}

fn default_note() -> String {
    "Add numbers in international format (e.g. +1234567890)".to_string()
}

impl Default for AllowlistFile {
    fn default() -> Self {
        Self {
            phone_numbers: Vec::new(),
            description: default_description(),
            note: default_note(),
        }
    }
}

pub struct Allowlist {
    path: PathBuf,
    entries: RwLock<BTreeSet<CanonicalIdentity>>,
}

impl Allowlist {
    /// Load the allowlist from `path`. A missing or corrupt file falls
    /// back to an empty list and a fresh default file is written in its
    /// place; opening never fails the startup path.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<AllowlistFile>(&content) {
                Ok(file) => {
                    let set: BTreeSet<CanonicalIdentity> = file
                        .phone_numbers
                        .iter()
                        .map(|n| normalize(n))
                        .filter(|id| !id.is_empty())
                        .collect();
                    tracing::info!(count = set.len(), path = %path.display(), "loaded allowlist");
                    set
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "corrupt allowlist file, starting empty");
                    let set = BTreeSet::new();
                    if let Err(e) = write_file(&path, &set) {
                        tracing::warn!(error = %e, "could not replace corrupt allowlist file");
                    }
                    set
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "no allowlist file, creating default");
                let set = BTreeSet::new();
                if let Err(e) = write_file(&path, &set) {
                    tracing::warn!(error = %e, "could not create default allowlist file");
                }
                set
            }
        };
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub async fn contains(&self, identity: &CanonicalIdentity) -> bool {
        if identity.is_empty() {
            return false;
        }
        self.entries.read().await.contains(identity)
    }

    /// Add a number. Returns `true` if it was newly added, `false` if the
    /// canonical form was already present. The mutation is only committed
    /// once it has been persisted.
    pub async fn add(&self, raw: &str, label: Option<&str>) -> Result<bool> {
        let identity = normalize(raw);
        if identity.is_empty() {
            anyhow::bail!("'{raw}' contains no digits, refusing to allowlist it");
        }
        let mut entries = self.entries.write().await;
        if entries.contains(&identity) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.insert(identity.clone());
        write_file(&self.path, &next)?;
        *entries = next;
        tracing::info!(identity = %identity, label = label.unwrap_or(""), "added to allowlist");
        Ok(true)
    }

    /// Remove a number. Returns `true` if it was present. Persisted before
    /// the in-memory set is updated, like `add`.
    pub async fn remove(&self, raw: &str) -> Result<bool> {
        let identity = normalize(raw);
        let mut entries = self.entries.write().await;
        if !entries.contains(&identity) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.remove(&identity);
        write_file(&self.path, &next)?;
        *entries = next;
        tracing::info!(identity = %identity, "removed from allowlist");
        Ok(true)
    }

    /// Snapshot of all canonical identities, in sorted order.
    pub async fn all(&self) -> Vec<CanonicalIdentity> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn write_file(path: &Path, entries: &BTreeSet<CanonicalIdentity>) -> Result<()> {
    let file = AllowlistFile {
        phone_numbers: entries.iter().map(|id| id.as_str().to_string()).collect(),
        ..AllowlistFile::default()
    };
    let json = serde_json::to_string_pretty(&file).context("serializing allowlist")?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("writing allowlist temp file {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("replacing allowlist file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("allowlist.json")
    }

    #[tokio::test]
    async fn add_contains_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let list = Allowlist::open(temp_path(&dir));

        assert!(list.add("(555) 123-4567", Some("Ana")).await.unwrap());
        assert!(list.contains(&normalize("+5551234567")).await);

        assert!(list.remove("555-123-4567").await.unwrap());
        assert!(!list.contains(&normalize("+5551234567")).await);
    }

    #[tokio::test]
    async fn duplicate_add_is_reported_and_leaves_set_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let list = Allowlist::open(temp_path(&dir));

        assert!(list.add("+15551234567", None).await.unwrap());
        // Different formatting, same canonical form.
        assert!(!list.add("1 (555) 123-4567", None).await.unwrap());
        assert_eq!(list.len().await, 1);
    }

    #[tokio::test]
    async fn mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);

        {
            let list = Allowlist::open(&path);
            list.add("+15551234567", None).await.unwrap();
            list.add("+4479460000", Some("Sam")).await.unwrap();
        }

        let reloaded = Allowlist::open(&path);
        assert_eq!(reloaded.len().await, 2);
        assert!(reloaded.contains(&normalize("+15551234567")).await);
    }

    #[tokio::test]
    async fn corrupt_file_falls_back_to_empty_and_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        std::fs::write(&path, "{ this is not json").unwrap();

        let list = Allowlist::open(&path);
        assert!(list.is_empty().await);

        // The file on disk was replaced with a valid empty document.
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: AllowlistFile = serde_json::from_str(&content).unwrap();
        assert!(parsed.phone_numbers.is_empty());
    }

    #[tokio::test]
    async fn digitless_number_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let list = Allowlist::open(temp_path(&dir));
        assert!(list.add("not a number", None).await.is_err());
        assert!(list.is_empty().await);
    }

    #[tokio::test]
    async fn empty_identity_never_matches() {
        let dir = tempfile::tempdir().unwrap();
        let list = Allowlist::open(temp_path(&dir));
        list.add("+15551234567", None).await.unwrap();
        assert!(!list.contains(&normalize("")).await);
    }
}
