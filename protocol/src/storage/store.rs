//! # BlockStore — Chain File Persistence
//!
//! The whole chain lives in one pretty-printed JSON file,
//! `<data_dir>/blockchain.json`. Every save rewrites it in full.
//!
//! ## Atomicity
//!
//! Saves go to a sibling temp file that is then renamed over the real one,
//! so readers never see a half-written array. A crash between accepting a
//! block in memory and finishing the rename still loses that block; the
//! in-memory chain is authoritative while the process lives.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::chain::Blockchain;
use crate::config::chain_file_path;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or saving the chain.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("chain file {path} is not a valid chain: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode chain: {0}")]
    Encode(#[source] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// BlockStore
// ---------------------------------------------------------------------------

/// Sole owner of the persisted chain file.
#[derive(Debug, Clone)]
pub struct BlockStore {
    dir: PathBuf,
    path: PathBuf,
}

impl BlockStore {
    /// A store rooted at `data_dir`. Nothing touches the disk until
    /// [`load`](Self::load) or [`save`](Self::save).
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let dir = data_dir.into();
        let path = chain_file_path(&dir);
        Self { dir, path }
    }

    /// Path of the chain file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted chain, bootstrapping a genesis-only chain file
    /// when none exists yet.
    pub fn load(&self) -> StoreResult<Blockchain> {
        if !self.path.exists() {
            fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            self.save(&Blockchain::genesis())?;
            info!(path = %self.path.display(), "initialized chain with genesis block");
        }

        let content = fs::read(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        let chain: Blockchain =
            serde_json::from_slice(&content).map_err(|source| StoreError::Decode {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), blocks = chain.len(), "chain loaded");
        Ok(chain)
    }

    /// Overwrites the persisted chain with `chain`.
    pub fn save(&self, chain: &Blockchain) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(chain).map_err(StoreError::Encode)?;

        let tmp = self.path.with_extension("json.tmp");
        let io_err = |source| StoreError::Io {
            path: tmp.clone(),
            source,
        };
        {
            let mut file = fs::File::create(&tmp).map_err(io_err)?;
            file.write_all(&bytes).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), blocks = chain.len(), "chain saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block::Block;
    use crate::config::CHAIN_FILE_NAME;

    #[test]
    fn load_bootstraps_missing_storage() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::new(dir.path().join("nested").join("data"));

        let chain = store.load().unwrap();
        assert_eq!(chain, Blockchain::genesis());
        assert!(store.path().exists());

        // Second load reads the bootstrapped file back.
        let again = store.load().unwrap();
        assert_eq!(again, chain);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::new(dir.path());

        let mut chain = Blockchain::genesis();
        let b1 = Block::new(chain.tip().unwrap(), "tx-a".into(), 11, b"p1".to_vec()).unwrap();
        chain.append(b1.clone());
        chain.append(Block::new(&b1, String::new(), 12, vec![0, 255, 7]).unwrap());

        store.save(&chain).unwrap();
        assert_eq!(store.load().unwrap(), chain);
    }

    #[test]
    fn file_is_pretty_printed_with_wire_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::new(dir.path());
        store.load().unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.starts_with("[\n  {\n    \"Index\": 0,"));
        assert!(text.contains("\"PrevHash\": \"\""));
        assert!(text.contains("\"Proof\": \"\""));
    }

    #[test]
    fn corrupt_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::new(dir.path());
        std::fs::write(store.path(), b"{not json").unwrap();

        assert!(matches!(store.load(), Err(StoreError::Decode { .. })));
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::new(dir.path());
        store.save(&Blockchain::genesis()).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(CHAIN_FILE_NAME)]);
    }
}
