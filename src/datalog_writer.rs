use crate::prelude::*;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Appends every decoded record to a file, one JSON object per line.
#[derive(Debug, Clone)]
pub struct DatalogWriter {
    file: Arc<Mutex<std::fs::File>>,
    path: String,
    values_written: Arc<Mutex<u64>>,
}

impl DatalogWriter {
    pub fn new(path: &str) -> Result<Self> {
        info!("Opening datalog file at {}", path);

        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to open datalog file {}: {}", path, e);
                return Err(e.into());
            }
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)) {
                error!("Failed to set permissions on datalog file {}: {}", path, e);
                return Err(e.into());
            }
        }

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_string(),
            values_written: Arc::new(Mutex::new(0)),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn write_record(&self, record: &TelemetryRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        {
            let mut file = self
                .file
                .lock()
                .map_err(|_| anyhow!("datalog file lock poisoned"))?;
            file.write_all(line.as_bytes())?;
            file.flush()?;
        }

        if let Ok(mut count) = self.values_written.lock() {
            *count += 1;
            trace!("{} records written to {}", *count, self.path);
        }

        Ok(())
    }

    pub fn values_written(&self) -> u64 {
        self.values_written.lock().map(|c| *c).unwrap_or(0)
    }
}
