//! Session directory layout
//!
//! ```text
//! ses-20240604/
//!   timing-dumps/
//!     dump_birch.jsonl
//!     dump_dicoms.jsonl
//!     dump_psychopy.jsonl
//!     dump_qrinfo.jsonl
//!     dump_reproevents.jsonl
//!     dump_marks.jsonl
//!     dump_tmap.jsonl
//! ```

use std::path::{Path, PathBuf};

use contracts::{Clock, ContractError};

/// Name of the per-session dump directory
pub const DUMPS_DIR: &str = "timing-dumps";

/// Marks artifact file name
pub const MARKS_FILE: &str = "dump_marks.jsonl";

/// Timing map artifact file name
pub const TMAP_FILE: &str = "dump_tmap.jsonl";

/// Paths of one recording session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    root: PathBuf,
    dumps: PathBuf,
}

impl SessionLayout {
    /// Layout rooted at a session directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let dumps = root.join(DUMPS_DIR);
        Self { root, dumps }
    }

    /// Layout rooted at a session directory that must contain `timing-dumps/`
    ///
    /// # Errors
    /// `MissingFile` when the dumps directory does not exist
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ContractError> {
        let layout = Self::new(root);
        if !layout.dumps.is_dir() {
            return Err(ContractError::MissingFile { path: layout.dumps });
        }
        Ok(layout)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dumps_dir(&self) -> &Path {
        &self.dumps
    }

    /// Event dump of a clock domain, e.g. `dump_qrinfo.jsonl`
    pub fn events_path(&self, clock: Clock) -> PathBuf {
        self.dumps
            .join(format!("dump_{}.jsonl", clock.canonical().as_str()))
    }

    pub fn marks_path(&self) -> PathBuf {
        self.dumps.join(MARKS_FILE)
    }

    pub fn tmap_path(&self) -> PathBuf {
        self.dumps.join(TMAP_FILE)
    }

    /// Session id derived from the directory name, e.g. `ses-20240604`
    pub fn session_id(&self) -> Option<String> {
        self.root
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}
