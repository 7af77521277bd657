//! Decoder configuration.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use eltm_core::GlobalAttributes;
use serde::Deserialize;

use crate::layout::LayoutVersion;
use crate::splitter::IndexPolicy;
use crate::Result;

/// Configuration shared by the decoder, splitter and batch driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    /// Wire layout of every record in the input.
    pub layout: LayoutVersion,
    /// Rule for declared block indices.
    pub index_policy: IndexPolicy,
    /// Decode bitstrings on the rayon thread pool.
    pub parallel: bool,
    /// Provenance metadata copied into every dataset.
    pub global_attributes: GlobalAttributes,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            layout: LayoutVersion::V1,
            index_policy: IndexPolicy::Consecutive,
            parallel: true,
            global_attributes: GlobalAttributes::new(),
        }
    }
}

// Intermediate structs so partial JSON files fall back to defaults
#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonConfig {
    decoder: JsonDecoder,
    global_attributes: GlobalAttributes,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonDecoder {
    layout: LayoutVersion,
    index_policy: IndexPolicy,
    parallel: bool,
}

impl Default for JsonDecoder {
    fn default() -> Self {
        let defaults = DecoderConfig::default();
        Self {
            layout: defaults.layout,
            index_policy: defaults.index_policy,
            parallel: defaults.parallel,
        }
    }
}

impl From<JsonConfig> for DecoderConfig {
    fn from(json: JsonConfig) -> Self {
        Self {
            layout: json.decoder.layout,
            index_policy: json.decoder.index_policy,
            parallel: json.decoder.parallel,
            global_attributes: json.global_attributes,
        }
    }
}

impl DecoderConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wire layout.
    #[must_use]
    pub fn with_layout(mut self, layout: LayoutVersion) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the block index rule.
    #[must_use]
    pub fn with_index_policy(mut self, policy: IndexPolicy) -> Self {
        self.index_policy = policy;
        self
    }

    /// Sets whether to decode in parallel.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets the global attributes.
    #[must_use]
    pub fn with_global_attributes(mut self, attributes: GlobalAttributes) -> Self {
        self.global_attributes = attributes;
        self
    }

    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let json: JsonConfig = serde_json::from_reader(reader)?;
        Ok(json.into())
    }

    /// Loads configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string is not valid JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let json: JsonConfig = serde_json::from_str(json)?;
        Ok(json.into())
    }
}
