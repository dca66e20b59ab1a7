//! Best-effort persistence of dump output to distribution config files
//!
//! Debian/Ubuntu and RHEL/CentOS keep saved rules and routes in different
//! places; each target is tried in order and the first successful write wins.
//! The bytes are written exactly as the tool printed them.
//!
//! Only targets marked `create_parent` get their directory created. For the
//! others a missing directory means "not this distribution" and the next
//! target is tried.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("no persistence targets configured")]
    NoTargets,

    #[error("failed to save to any standard location ({})", .attempts.join("; "))]
    AllFailed { attempts: Vec<String> },
}

/// One candidate file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersistTarget {
    pub path: PathBuf,
    #[serde(default)]
    pub create_parent: bool,
}

impl PersistTarget {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            create_parent: false,
        }
    }

    pub fn creating_parent(mut self) -> Self {
        self.create_parent = true;
        self
    }

    fn write(&self, dump: &[u8]) -> std::io::Result<()> {
        if self.create_parent {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }
        fs::write(&self.path, dump)
    }
}

/// Ordered list of candidate files for one kind of dump
#[derive(Debug, Clone)]
pub struct PersistenceBridge {
    targets: Vec<PersistTarget>,
}

impl PersistenceBridge {
    pub fn new(targets: Vec<PersistTarget>) -> Self {
        Self { targets }
    }

    /// Bridge whose targets never create directories
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Self {
        Self::new(paths.iter().map(|p| PersistTarget::new(p.as_ref())).collect())
    }

    /// Write `dump` to the first target that accepts it.
    pub fn save(&self, dump: &[u8]) -> Result<PathBuf, PersistError> {
        if self.targets.is_empty() {
            return Err(PersistError::NoTargets);
        }

        let mut attempts = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            match target.write(dump) {
                Ok(()) => {
                    info!("Saved {} bytes to {}", dump.len(), target.path.display());
                    return Ok(target.path.clone());
                }
                Err(e) => {
                    debug!("Could not save to {}: {e}", target.path.display());
                    attempts.push(format!("{}: {e}", target.path.display()));
                }
            }
        }

        Err(PersistError::AllFailed { attempts })
    }
}
