//! Artifact encoding and file IO
//!
//! Writes go to a temporary file in the destination directory which is then
//! renamed over the target, so readers never observe a partial artifact.

use std::fs;
use std::io::Write;
use std::path::Path;

use tabex_core::{Error, Result};
use tempfile::NamedTempFile;
use tracing::info;

use crate::artifact::{Artifact, FORMAT_VERSION};
use crate::config::ArtifactFormat;

impl Artifact {
    /// Encode in the given format
    ///
    /// JSON has no encoding for infinities or NaN, so a JSON artifact with a
    /// non-finite parameter is refused instead of being written unreadable.
    pub fn to_bytes(&self, format: ArtifactFormat) -> Result<Vec<u8>> {
        match format {
            ArtifactFormat::Json => {
                if let Some(op) = self.operations.iter().find(|op| !op.kind.is_finite()) {
                    return Err(Error::InvalidArgument(format!(
                        "{} has a non-finite parameter, which JSON cannot encode",
                        op.kind.name()
                    )));
                }
                Ok(serde_json::to_vec_pretty(self)?)
            }
            ArtifactFormat::Binary => Ok(bincode::serialize(self)?),
        }
    }

    /// Decode, failing with `ArtifactCorrupt` on any parse error
    pub fn from_bytes(bytes: &[u8], format: ArtifactFormat) -> Result<Self> {
        let artifact: Self = match format {
            ArtifactFormat::Json => serde_json::from_slice(bytes)
                .map_err(|e| Error::ArtifactCorrupt(format!("invalid JSON artifact: {e}")))?,
            ArtifactFormat::Binary => bincode::deserialize(bytes)
                .map_err(|e| Error::ArtifactCorrupt(format!("invalid binary artifact: {e}")))?,
        };

        if artifact.format_version != FORMAT_VERSION {
            return Err(Error::ArtifactCorrupt(format!(
                "unsupported format version {}, expected {FORMAT_VERSION}",
                artifact.format_version
            )));
        }
        Ok(artifact)
    }
}

/// Atomically write an artifact to `path`
pub fn write_artifact(path: &Path, artifact: &Artifact, format: ArtifactFormat) -> Result<()> {
    let bytes = artifact.to_bytes(format)?;
    write_atomic(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), ?format, "wrote artifact");
    Ok(())
}

/// Read and decode an artifact from `path`
pub fn read_artifact(path: &Path, format: ArtifactFormat) -> Result<Artifact> {
    let bytes = fs::read(path)?;
    Artifact::from_bytes(&bytes, format)
}

/// Replace `path` with `bytes` through a temporary sibling file
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
