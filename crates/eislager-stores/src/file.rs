use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eislager_core::{AuditError, AuditRecord, AuditStore};

/// Appends one JSON document per line to `path`.
#[derive(Debug, Clone)]
pub struct FileAuditStore {
    path: PathBuf,
}

impl FileAuditStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn insert(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await
            .map_err(|err| AuditError::Backend(format!("file writer task failed: {err}")))?
    }
}

fn append_line(path: &Path, line: &[u8]) -> Result<(), AuditError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line)?;
    Ok(())
}

/// Reads the last `lines` records of a JSON-lines audit file. Lines that do
/// not parse are skipped.
pub fn read_tail(path: &Path, lines: usize) -> Result<Vec<AuditRecord>, AuditError> {
    let file = std::fs::File::open(path)?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<AuditRecord>(&line) {
            records.push(record);
        }
    }

    let skip = records.len().saturating_sub(lines);
    Ok(records.split_off(skip))
}
