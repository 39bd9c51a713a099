//! User-facing output options.
//!
//! Read from JSON; every field is optional. The mapping policy accepts the
//! classic numeric levels as well as names:
//!
//! ```json
//! { "mapping": 0, "accelerated": true, "bind_texture": false, "max_surfaces": 21 }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::policy::MappingPolicy;
use crate::present::{PresentPath, TextureTransfer};
use crate::sizing::MAX_VIDEO_SURFACES;

#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Failed to read options from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid output options: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    #[serde(deserialize_with = "deserialize_policy")]
    pub mapping: MappingPolicy,
    /// Present through the accelerated rendering path instead of the window.
    pub accelerated: bool,
    /// With `accelerated`, bind surfaces as textures instead of copying.
    pub bind_texture: bool,
    /// Ceiling on surfaces allocated for indirect mapping.
    pub max_surfaces: usize,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            mapping: MappingPolicy::Auto,
            accelerated: false,
            bind_texture: false,
            max_surfaces: MAX_VIDEO_SURFACES,
        }
    }
}

impl OutputOptions {
    pub fn from_json_str(json: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn present_path(&self) -> PresentPath {
        if !self.accelerated {
            return PresentPath::Window;
        }
        if self.bind_texture {
            PresentPath::AcceleratedSurface(TextureTransfer::Bind)
        } else {
            PresentPath::AcceleratedSurface(TextureTransfer::Copy)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PolicyRepr {
    Level(u8),
    Name(String),
}

fn deserialize_policy<'de, D>(deserializer: D) -> Result<MappingPolicy, D::Error>
where
    D: Deserializer<'de>,
{
    match PolicyRepr::deserialize(deserializer)? {
        PolicyRepr::Level(level) => MappingPolicy::from_level(level).ok_or_else(|| {
            serde::de::Error::custom(format!("mapping level {level} out of range (0..=2)"))
        }),
        PolicyRepr::Name(name) => name.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let options = OutputOptions::from_json_str("{}").unwrap();
        assert_eq!(options, OutputOptions::default());
        assert_eq!(options.max_surfaces, 21);
        assert_eq!(options.present_path(), PresentPath::Window);
    }

    #[test]
    fn numeric_and_named_policies() {
        let numeric = OutputOptions::from_json_str(r#"{"mapping": 0}"#).unwrap();
        assert_eq!(numeric.mapping, MappingPolicy::Indirect);

        let named = OutputOptions::from_json_str(r#"{"mapping": "direct"}"#).unwrap();
        assert_eq!(named.mapping, MappingPolicy::Direct);

        assert!(OutputOptions::from_json_str(r#"{"mapping": 5}"#).is_err());
        assert!(OutputOptions::from_json_str(r#"{"mapping": "often"}"#).is_err());
    }

    #[test]
    fn accelerated_path_selection() {
        let copy = OutputOptions::from_json_str(r#"{"accelerated": true}"#).unwrap();
        assert_eq!(
            copy.present_path(),
            PresentPath::AcceleratedSurface(TextureTransfer::Copy)
        );

        let bind =
            OutputOptions::from_json_str(r#"{"accelerated": true, "bind_texture": true}"#).unwrap();
        assert_eq!(
            bind.present_path(),
            PresentPath::AcceleratedSurface(TextureTransfer::Bind)
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let err = OutputOptions::from_path("/nonexistent/vo-options.json").unwrap_err();
        assert!(matches!(err, OptionsError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/vo-options.json"));
    }

    #[test]
    fn serializes_policy_by_name() {
        let json = serde_json::to_string(&OutputOptions::default()).unwrap();
        assert!(json.contains(r#""mapping":"auto""#));
    }
}
