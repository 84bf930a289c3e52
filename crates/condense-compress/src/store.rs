//! Per-owner context files on disk

use anyhow::{bail, Context, Result};
use condense_core::markup::render;
use condense_core::ContextDocument;
use condense_telemetry::{atomic_write, Paths};
use std::fs;

pub struct ContextStore {
    paths: Paths,
}

/// Owner ids become directory names, so only `[A-Za-z0-9_-]` is allowed
pub fn validate_owner(owner: &str) -> Result<()> {
    if owner.is_empty() || !owner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        bail!("invalid owner id {owner:?}: use letters, digits, '_' or '-'");
    }
    Ok(())
}

impl ContextStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn exists(&self, owner: &str) -> Result<bool> {
        validate_owner(owner)?;
        Ok(self.paths.context_file(owner).exists())
    }

    pub fn load(&self, owner: &str) -> Result<Option<String>> {
        validate_owner(owner)?;
        let path = self.paths.context_file(owner);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(text))
    }

    /// Stored text, creating an empty four-section document first if needed
    pub fn load_or_init(&self, owner: &str) -> Result<String> {
        if let Some(text) = self.load(owner)? {
            return Ok(text);
        }
        let text = render(&ContextDocument::new());
        self.save(owner, &text)?;
        tracing::info!(owner, "initialized empty context");
        Ok(text)
    }

    pub fn save(&self, owner: &str, text: &str) -> Result<()> {
        validate_owner(owner)?;
        let path = self.paths.context_file(owner);
        atomic_write(&path, text.as_bytes()).with_context(|| format!("writing {}", path.display()))
    }

    /// Snapshot taken before a compression overwrites the context
    pub fn backup(&self, owner: &str, text: &str) -> Result<()> {
        validate_owner(owner)?;
        let path = self.paths.backup_file(owner);
        atomic_write(&path, text.as_bytes()).with_context(|| format!("writing {}", path.display()))
    }

    pub fn load_backup(&self, owner: &str) -> Result<Option<String>> {
        validate_owner(owner)?;
        let path = self.paths.backup_file(owner);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    /// Owners with a stored context, sorted
    pub fn owners(&self) -> Result<Vec<String>> {
        let dir = self.paths.owners_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut owners = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(owner) = name.to_str().and_then(|n| n.strip_prefix("user_")) else {
                continue;
            };
            if validate_owner(owner).is_ok() && entry.path().join("context.xml").exists() {
                owners.push(owner.to_string());
            }
        }
        owners.sort();
        Ok(owners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ContextStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(Paths::with_root(dir.path()));
        (dir, store)
    }

    #[test]
    fn test_load_or_init_creates_empty_document() {
        let (_dir, store) = store();
        assert!(!store.exists("alice").unwrap());
        let text = store.load_or_init("alice").unwrap();
        assert!(store.exists("alice").unwrap());
        assert_eq!(condense_core::parse(&text).unwrap(), ContextDocument::new());
        assert_eq!(store.load_or_init("alice").unwrap(), text);
    }

    #[test]
    fn test_backup_is_separate_from_context() {
        let (_dir, store) = store();
        store.save("bob", "<context>new</context>").unwrap();
        store.backup("bob", "<context>old</context>").unwrap();
        assert_eq!(store.load("bob").unwrap().as_deref(), Some("<context>new</context>"));
        assert_eq!(store.load_backup("bob").unwrap().as_deref(), Some("<context>old</context>"));
        assert!(store.load_backup("carol").unwrap().is_none());
    }

    #[test]
    fn test_owners_listing() {
        let (_dir, store) = store();
        assert!(store.owners().unwrap().is_empty());
        store.load_or_init("zed").unwrap();
        store.load_or_init("amy-2").unwrap();
        assert_eq!(store.owners().unwrap(), vec!["amy-2", "zed"]);
    }

    #[test]
    fn test_rejects_path_like_owner_ids() {
        let (_dir, store) = store();
        for bad in ["", "../etc", "a/b", "name with space"] {
            assert!(store.save(bad, "x").is_err(), "{bad:?} should be rejected");
        }
        assert!(validate_owner("team_42-a").is_ok());
    }
}
