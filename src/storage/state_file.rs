//! Dynamic state file: the last accepted ClusterSet identity, view-id and
//! metadata-server list, used to bootstrap the next start.

use crate::core::{NodeAddress, Result, RouterError, ViewId};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::{Level, event};

const STATE_FORMAT_VERSION: &str = "1.0.0";
const SERVER_SCHEME: &str = "mysql://";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub version: String,
    #[serde(rename = "metadata-cache")]
    pub metadata_cache: MetadataCacheState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataCacheState {
    #[serde(rename = "clusterset-id")]
    pub clusterset_id: String,
    #[serde(rename = "cluster-metadata-servers")]
    pub cluster_metadata_servers: Vec<String>,
    #[serde(rename = "view-id")]
    pub view_id: ViewId,
}

impl StateRecord {
    pub fn new(clusterset_id: impl Into<String>, view_id: ViewId, servers: &[NodeAddress]) -> Self {
        Self {
            version: STATE_FORMAT_VERSION.to_string(),
            metadata_cache: MetadataCacheState {
                clusterset_id: clusterset_id.into(),
                cluster_metadata_servers: servers
                    .iter()
                    .map(|server| format!("{}{}", SERVER_SCHEME, server))
                    .collect(),
                view_id,
            },
        }
    }

    pub fn clusterset_id(&self) -> &str {
        &self.metadata_cache.clusterset_id
    }

    pub fn view_id(&self) -> ViewId {
        self.metadata_cache.view_id
    }

    /// Metadata servers as addresses; the `mysql://` scheme is optional.
    pub fn servers(&self) -> Result<Vec<NodeAddress>> {
        self.metadata_cache
            .cluster_metadata_servers
            .iter()
            .map(|uri| {
                uri.strip_prefix(SERVER_SCHEME)
                    .unwrap_or(uri)
                    .parse::<NodeAddress>()
                    .map_err(|e| {
                        RouterError::StateFileError(format!("bad server '{}': {}", uri, e))
                    })
            })
            .collect()
    }
}

/// Reads and atomically rewrites the state file.
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    last_written: Mutex<Option<StateRecord>>,
}

impl StateFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            last_written: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the record, or `None` when the file does not exist yet.
    pub fn load(&self) -> Result<Option<StateRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file = File::open(&self.path)
            .map_err(|e| {
                RouterError::StateFileError(format!("Failed to open state file: {}", e))
            })?;
        let record: StateRecord = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| {
                RouterError::StateFileError(format!("Failed to parse state file: {}", e))
            })?;

        *self.last_written.lock()? = Some(record.clone());
        Ok(Some(record))
    }

    /// Persists the accepted topology.
    ///
    /// Returns `false` without touching the file when `servers` is empty or
    /// when the record is identical to what is already on disk.
    pub fn write(
        &self,
        clusterset_id: &str,
        view_id: ViewId,
        servers: &[NodeAddress],
    ) -> Result<bool> {
        if servers.is_empty() {
            event!(
                Level::DEBUG,
                path = %self.path.display(),
                view_id,
                "Skipping state file write with no metadata servers"
            );
            return Ok(false);
        }

        let record = StateRecord::new(clusterset_id, view_id, servers);
        let mut last_written = self.last_written.lock()?;
        if last_written.as_ref() == Some(&record) {
            return Ok(false);
        }

        self.persist(&record)?;
        event!(
            Level::DEBUG,
            path = %self.path.display(),
            clusterset_id,
            view_id,
            servers = servers.len(),
            "State file updated"
        );
        *last_written = Some(record);
        Ok(true)
    }

    fn persist(&self, record: &StateRecord) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let temp = NamedTempFile::new_in(&dir)
            .map_err(|e| {
                RouterError::StateFileError(format!("Failed to create temp file: {}", e))
            })?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, record)
                .map_err(|e| {
                    RouterError::StateFileError(format!("Failed to serialize state: {}", e))
                })?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        temp.persist(&self.path)
            .map_err(|e| {
                RouterError::StateFileError(format!("Failed to rename state file: {}", e))
            })?;
        Ok(())
    }
}
