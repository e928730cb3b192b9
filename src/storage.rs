// Storage module - previous-value bookkeeping for delta checks
//
// The task counter checks can compare a metric with the value seen on the
// previous run. Values live in a small JSON document on local disk, keyed
// by metric name. The whole read-modify-write happens under an exclusive
// file lock so two checks sharing the file never lose an update.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Location shared by every delta check unless overridden
pub const DEFAULT_STORE_PATH: &str = "/tmp/mesos-metrics.db";

/// Errors that can occur while reading or updating the store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot access metric store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metric store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// File-backed map of metric name to last seen value
#[derive(Debug, Clone)]
pub struct MetricStore {
    path: PathBuf,
}

impl MetricStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MetricStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores `value` under `key` and returns the previous value (0 if none).
    pub fn swap(&self, key: &str, value: i64) -> Result<i64, StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(io_err)?;
        file.lock().map_err(io_err)?;

        let mut values = self.read_values(&mut file)?;
        let previous = values.insert(key.to_string(), value).unwrap_or_default();

        let serialized = serde_json::to_vec(&values).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        file.set_len(0).map_err(io_err)?;
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        file.write_all(&serialized).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        file.unlock().map_err(io_err)?;

        debug!("Metric '{}' moved from {} to {}", key, previous, value);
        Ok(previous)
    }

    /// Difference between `value` and the previously stored one.
    pub fn delta(&self, key: &str, value: i64) -> Result<i64, StoreError> {
        let previous = self.swap(key, value)?;
        Ok(value - previous)
    }

    fn read_values(&self, file: &mut File) -> Result<BTreeMap<String, i64>, StoreError> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }
}
