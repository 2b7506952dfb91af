use crate::duplicate_checker::DuplicatePropertyNamesChecker;
use crate::error::{ODataError, StructuralError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// OData protocol versions. Ordering follows the protocol history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ODataVersion {
    #[serde(rename = "1.0", alias = "V1")]
    V1,
    #[serde(rename = "2.0", alias = "V2")]
    V2,
    #[serde(rename = "3.0", alias = "V3")]
    V3,
}

impl ODataVersion {
    /// Fails with `VersionNotSupported` when `self` is older than `required`.
    pub fn ensure_supports(self, feature: &str, required: ODataVersion) -> Result<(), ODataError> {
        if self < required {
            log::debug!("{feature} rejected under protocol version {self}");
            return Err(StructuralError::VersionNotSupported {
                feature: feature.to_string(),
                version: self.to_string(),
                required: required.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for ODataVersion {
    fn default() -> Self {
        ODataVersion::V3
    }
}

impl fmt::Display for ODataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ODataVersion::V1 => "1.0",
            ODataVersion::V2 => "2.0",
            ODataVersion::V3 => "3.0",
        };
        f.write_str(text)
    }
}

/// Wire formats known to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// Recognized during content negotiation; reading and writing XML is
    /// outside this crate.
    Atom,
    VerboseJson,
    #[default]
    JsonLight,
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PayloadFormat::Atom => "ATOM",
            PayloadFormat::VerboseJson => "Verbose JSON",
            PayloadFormat::JsonLight => "JSON Light",
        };
        f.write_str(text)
    }
}

impl PayloadFormat {
    /// JSON Light only exists from V3 on.
    pub fn ensure_supported_by(self, version: ODataVersion) -> Result<(), ODataError> {
        match self {
            PayloadFormat::JsonLight => version.ensure_supports("The JSON Light format", ODataVersion::V3),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    pub allow_duplicate_properties: bool,
    pub is_response: bool,
    pub version: ODataVersion,
    pub format: PayloadFormat,
    /// Capture the raw JSON text of custom annotations while reading entries.
    pub collect_raw_annotations: bool,
    pub max_nesting_depth: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            allow_duplicate_properties: false,
            is_response: true,
            version: ODataVersion::V3,
            format: PayloadFormat::JsonLight,
            collect_raw_annotations: false,
            max_nesting_depth: 100,
        }
    }
}

impl ReaderSettings {
    #[must_use]
    pub fn request() -> Self {
        Self {
            is_response: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn duplicate_property_names_checker(&self) -> DuplicatePropertyNamesChecker {
        DuplicatePropertyNamesChecker::new(self.allow_duplicate_properties, self.is_response)
            .with_raw_annotation_capture(self.collect_raw_annotations)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ODataError> {
        serde_json::from_str(text).map_err(config_error)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ODataError> {
        serde_yaml::from_str(text).map_err(config_error)
    }

    /// Loads settings from a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: &Path) -> Result<Self, ODataError> {
        let text = std::fs::read_to_string(path)?;
        match settings_format(path)? {
            SettingsFormat::Json => Self::from_json_str(&text),
            SettingsFormat::Yaml => Self::from_yaml_str(&text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    pub allow_duplicate_properties: bool,
    pub is_response: bool,
    pub version: ODataVersion,
    pub format: PayloadFormat,
    /// Base of the `odata.metadata` URI written by JSON Light writers.
    pub metadata_document_uri: Option<String>,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            allow_duplicate_properties: false,
            is_response: true,
            version: ODataVersion::V3,
            format: PayloadFormat::JsonLight,
            metadata_document_uri: None,
        }
    }
}

impl WriterSettings {
    #[must_use]
    pub fn request() -> Self {
        Self {
            is_response: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn duplicate_property_names_checker(&self) -> DuplicatePropertyNamesChecker {
        DuplicatePropertyNamesChecker::new(self.allow_duplicate_properties, self.is_response)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ODataError> {
        serde_json::from_str(text).map_err(config_error)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ODataError> {
        serde_yaml::from_str(text).map_err(config_error)
    }

    pub fn from_path(path: &Path) -> Result<Self, ODataError> {
        let text = std::fs::read_to_string(path)?;
        match settings_format(path)? {
            SettingsFormat::Json => Self::from_json_str(&text),
            SettingsFormat::Yaml => Self::from_yaml_str(&text),
        }
    }

    /// Content type announced for payloads produced with these settings.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self.format {
            PayloadFormat::JsonLight => {
                "application/json;odata=minimalmetadata;streaming=true;charset=utf-8"
            }
            PayloadFormat::VerboseJson => "application/json;odata=verbose;charset=utf-8",
            PayloadFormat::Atom => "application/atom+xml;charset=utf-8",
        }
    }
}

enum SettingsFormat {
    Json,
    Yaml,
}

fn settings_format(path: &Path) -> Result<SettingsFormat, ODataError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(SettingsFormat::Json),
        Some("yaml") | Some("yml") => Ok(SettingsFormat::Yaml),
        other => Err(ODataError::Config {
            message: format!(
                "unsupported settings file extension '{}'",
                other.unwrap_or_default()
            ),
        }),
    }
}

fn config_error(err: impl fmt::Display) -> ODataError {
    ODataError::Config {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ReaderSettings::default();
        assert!(!settings.allow_duplicate_properties);
        assert!(settings.is_response);
        assert_eq!(settings.version, ODataVersion::V3);
        assert_eq!(settings.format, PayloadFormat::JsonLight);
        assert_eq!(settings.max_nesting_depth, 100);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings =
            ReaderSettings::from_json_str(r#"{ "allow_duplicate_properties": true, "version": "2.0" }"#)
                .unwrap();
        assert!(settings.allow_duplicate_properties);
        assert_eq!(settings.version, ODataVersion::V2);
        assert!(settings.is_response);
    }

    #[test]
    fn test_yaml_settings() {
        let settings = WriterSettings::from_yaml_str(
            "is_response: false\nformat: verbose_json\nmetadata_document_uri: http://host/$metadata\n",
        )
        .unwrap();
        assert!(!settings.is_response);
        assert_eq!(settings.format, PayloadFormat::VerboseJson);
        assert_eq!(
            settings.metadata_document_uri.as_deref(),
            Some("http://host/$metadata")
        );
    }

    #[test]
    fn test_invalid_settings_report_config_error() {
        let err = ReaderSettings::from_json_str(r#"{ "version": "9.0" }"#).unwrap_err();
        assert!(matches!(err, ODataError::Config { .. }));
    }

    #[test]
    fn test_version_ordering() {
        assert!(ODataVersion::V1 < ODataVersion::V3);
        assert!(ODataVersion::V2.ensure_supports("Collections", ODataVersion::V3).is_err());
        assert!(ODataVersion::V3.ensure_supports("Collections", ODataVersion::V3).is_ok());
    }

    #[test]
    fn test_json_light_needs_v3() {
        assert!(PayloadFormat::JsonLight.ensure_supported_by(ODataVersion::V2).is_err());
        assert!(PayloadFormat::VerboseJson.ensure_supported_by(ODataVersion::V1).is_ok());
    }
}
