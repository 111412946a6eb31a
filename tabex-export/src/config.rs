//! Export and PMML options

use serde::{Deserialize, Serialize};

use crate::artifact::Producer;

/// On-disk artifact encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    /// UTF-8 JSON
    #[default]
    Json,

    /// bincode, little-endian fixed-width integers
    Binary,
}

impl ArtifactFormat {
    /// Conventional file extension
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Binary => "bin",
        }
    }
}

/// Options for [`crate::export`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Encoding used by [`crate::write_artifact`] callers
    pub format: ArtifactFormat,

    /// Slot holding numeric source columns
    pub numeric_slot: String,

    /// Slot holding categorical source columns
    pub categorical_slot: String,

    /// Slot holding text source columns
    pub text_slot: String,

    /// Producer recorded in the artifact
    pub producer: Producer,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ArtifactFormat::Json,
            numeric_slot: "numeric_input".to_string(),
            categorical_slot: "categorical_input".to_string(),
            text_slot: "text_input".to_string(),
            producer: Producer::default(),
        }
    }
}

/// Options for [`crate::to_pmml`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PmmlConfig {
    /// Name of the target field
    pub target: String,

    /// `Application` name in the header
    pub application: String,

    /// `Application` version in the header
    pub application_version: String,
}

impl Default for PmmlConfig {
    fn default() -> Self {
        Self {
            target: "target".to_string(),
            application: "tabex".to_string(),
            application_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
