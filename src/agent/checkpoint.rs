//! Versioned bincode checkpoint files.
//!
//! A checkpoint is a magic tag and a small header followed by the agent
//! payload. The header is decoded first so a file written by another format
//! version or another algorithm is rejected before its payload is touched.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize, Deserialize};

use crate::error::{EvoError, Result};
use crate::network::DESCRIPTOR_VERSION;

pub const CHECKPOINT_VERSION: u32 = 1;

const MAGIC: [u8; 4] = *b"EVRL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CheckpointHeader {
    version: u32,
    descriptor_version: u32,
    algo: String,
}

/// Per-slot checkpoint path: `<dir>/<algo>_<slot>.ckpt`.
pub fn checkpoint_path(dir: &Path, algo: &str, slot: usize) -> PathBuf {
    dir.join(format!("{}_{}.ckpt", algo, slot))
}

pub fn save<T: Serialize>(path: &Path, algo: &str, payload: &T) -> Result<()> {
    let header = CheckpointHeader {
        version: CHECKPOINT_VERSION,
        descriptor_version: DESCRIPTOR_VERSION,
        algo: algo.to_string(),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&MAGIC)?;
    bincode::serialize_into(&mut writer, &header)?;
    bincode::serialize_into(&mut writer, payload)?;
    writer.flush()?;
    Ok(())
}

pub fn load<T: DeserializeOwned>(path: &Path, algo: &str) -> Result<T> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 4];
    if reader.read_exact(&mut magic).is_err() || magic != MAGIC {
        return Err(EvoError::IncompatibleCheckpoint {
            expected: format!("{} checkpoint v{}", algo, CHECKPOINT_VERSION),
            found: "a file without a checkpoint header".to_string(),
        });
    }
    let header: CheckpointHeader = bincode::deserialize_from(&mut reader).map_err(|e| EvoError::IncompatibleCheckpoint {
        expected: format!("{} checkpoint v{}", algo, CHECKPOINT_VERSION),
        found: format!("unreadable header ({})", e),
    })?;
    let expected = (CHECKPOINT_VERSION, DESCRIPTOR_VERSION, algo);
    let found = (header.version, header.descriptor_version, header.algo.as_str());
    if expected != found {
        return Err(EvoError::IncompatibleCheckpoint {
            expected: format!("{} checkpoint v{} (descriptor v{})", algo, CHECKPOINT_VERSION, DESCRIPTOR_VERSION),
            found: format!(
                "{} checkpoint v{} (descriptor v{})",
                header.algo, header.version, header.descriptor_version
            ),
        });
    }
    Ok(bincode::deserialize_from(&mut reader)?)
}
