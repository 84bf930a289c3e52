//! Path resolution for stored contexts and the run log

use std::path::PathBuf;

/// Environment variable overriding the data root
pub const HOME_ENV: &str = "CONDENSE_HOME";

/// Resolves standard paths for condense data files
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
}

impl Paths {
    /// Resolve the data root from `CONDENSE_HOME`, falling back to `~/.condense`
    pub fn new() -> std::io::Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = dirs::home_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "home directory not found")
        })?;

        Ok(Self::with_root(home.join(".condense")))
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one subdirectory per owner
    pub fn owners_dir(&self) -> PathBuf {
        self.root.join("owners")
    }

    /// Per-owner directory (`user_<owner>` as in the stored layout)
    pub fn owner_dir(&self, owner: &str) -> PathBuf {
        self.owners_dir().join(format!("user_{}", owner))
    }

    /// Current context document for an owner
    pub fn context_file(&self, owner: &str) -> PathBuf {
        self.owner_dir(owner).join("context.xml")
    }

    /// Snapshot taken before the last compression
    pub fn backup_file(&self, owner: &str) -> PathBuf {
        self.owner_dir(owner).join("before_compressed.xml")
    }

    /// SQLite database recording compression runs
    pub fn runs_db(&self) -> PathBuf {
        self.root.join("runs.db")
    }
}
