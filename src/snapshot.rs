// Snapshot file format and I/O

use crate::error::Result;
use crate::models::{Category, Task};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Full serialized state of the store
///
/// `columns` holds task ids in display order; the task records themselves
/// live in `tasks`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tasks: BTreeMap<String, Task>,
    pub columns: BTreeMap<String, Vec<String>>,
    /// Absent in files written before categories existed
    #[serde(default)]
    pub categories: BTreeMap<String, Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_timestamp: Option<String>,
}

impl Snapshot {
    /// Stamp with the current UTC time
    pub fn stamped(mut self) -> Self {
        self.backup_timestamp = Some(now_rfc3339());
        self
    }
}

/// Current wall-clock time as an ISO-8601 string
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Read a snapshot file
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    file.lock_shared()?;
    let snapshot: Snapshot = serde_json::from_reader(BufReader::new(&file))?;
    // Lock is released when file is dropped

    debug!(
        file = ?path,
        tasks = snapshot.tasks.len(),
        columns = snapshot.columns.len(),
        categories = snapshot.categories.len(),
        "Read snapshot"
    );

    Ok(Some(snapshot))
}

/// Write a snapshot file atomically
///
/// The JSON goes to a sibling `.tmp` file which is synced and then renamed
/// over `path`, so readers never observe a partial snapshot.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp_path = tmp_path_for(path);

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;

    // Acquire exclusive lock before writing
    file.lock_exclusive()?;
    file.write_all(&json)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;

    debug!(file = ?path, bytes = json.len(), "Wrote snapshot");
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
