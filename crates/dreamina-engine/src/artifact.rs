use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Image bytes plus the destination they belong at.
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl ImageArtifact {
    pub fn new(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    /// Writes the artifact exactly once: parents are created as needed, the
    /// bytes go to a sibling temporary file, and the file is renamed into
    /// place. A failure at any step leaves no partial output at `path`.
    pub fn persist(&self) -> Result<Written, Error> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|err| Error::write_failed(&self.path, err))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|err| Error::write_failed(&self.path, err))?;
        tmp.write_all(&self.bytes)
            .map_err(|err| Error::write_failed(&self.path, err))?;
        tmp.persist(&self.path)
            .map_err(|err| Error::write_failed(&self.path, err.error))?;

        Ok(Written {
            path: self.path.clone(),
            bytes: self.bytes.len() as u64,
        })
    }
}

/// Successful persistence report: destination path and byte count.
#[derive(Debug, Clone)]
pub struct Written {
    pub path: PathBuf,
    pub bytes: u64,
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<Written, Error> {
    ImageArtifact::new(path, bytes.to_vec()).persist()
}
