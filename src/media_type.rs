//! Content-type parsing, payload format detection and charset resolution.

use crate::error::{ODataError, StructuralError};
use crate::settings::PayloadFormat;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub type_name: String,
    pub subtype: String,
    pub parameters: Vec<(String, String)>,
}

impl MediaType {
    /// Parses `type/subtype;name=value;...`. Type, subtype and parameter
    /// names are lower-cased; parameter values keep their case, with
    /// surrounding quotes removed.
    pub fn parse(text: &str) -> Result<Self, ODataError> {
        let invalid = |reason: &str| -> ODataError {
            StructuralError::InvalidMediaType {
                media_type: text.to_string(),
                reason: reason.to_string(),
            }
            .into()
        };

        let mut segments = text.split(';');
        let essence = segments.next().unwrap_or_default().trim();
        let (type_name, subtype) = essence
            .split_once('/')
            .ok_or_else(|| invalid("missing '/' between type and subtype"))?;
        let type_name = type_name.trim();
        let subtype = subtype.trim();
        if type_name.is_empty() || subtype.is_empty() {
            return Err(invalid("empty type or subtype"));
        }

        let mut parameters = Vec::new();
        for segment in segments {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (name, value) = segment
                .split_once('=')
                .ok_or_else(|| invalid("parameter without '='"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid("parameter without a name"));
            }
            let value = value.trim().trim_matches('"');
            parameters.push((name.to_ascii_lowercase(), value.to_string()));
        }

        Ok(Self {
            type_name: type_name.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parameters,
        })
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The payload format this media type selects, if any.
    #[must_use]
    pub fn format(&self) -> Option<PayloadFormat> {
        match (self.type_name.as_str(), self.subtype.as_str()) {
            ("application", "json") => match self.parameter("odata") {
                Some(odata) if odata.eq_ignore_ascii_case("verbose") => {
                    Some(PayloadFormat::VerboseJson)
                }
                _ => Some(PayloadFormat::JsonLight),
            },
            ("application", "atom+xml") | ("application", "xml") => Some(PayloadFormat::Atom),
            _ => None,
        }
    }
}

/// Character sets the readers can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Utf16Le,
    Utf16Be,
    Ascii,
    Latin1,
}

impl Charset {
    pub fn from_name(name: &str) -> Result<Self, ODataError> {
        match name.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "utf-16" | "utf-16le" => Ok(Charset::Utf16Le),
            "utf-16be" => Ok(Charset::Utf16Be),
            "us-ascii" | "ascii" => Ok(Charset::Ascii),
            "iso-8859-1" | "latin1" => Ok(Charset::Latin1),
            _ => Err(StructuralError::UnsupportedEncoding {
                charset: name.to_string(),
            }
            .into()),
        }
    }

    /// Decodes raw payload bytes, dropping a leading byte order mark.
    pub fn decode(self, bytes: &[u8]) -> Result<String, ODataError> {
        let malformed = || -> ODataError {
            StructuralError::UnsupportedEncoding {
                charset: format!("{self:?} (malformed input)"),
            }
            .into()
        };
        match self {
            Charset::Utf8 => {
                let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
                String::from_utf8(bytes.to_vec()).map_err(|_| malformed())
            }
            Charset::Utf16Le | Charset::Utf16Be => {
                if bytes.len() % 2 != 0 {
                    return Err(malformed());
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| match self {
                        Charset::Utf16Be => u16::from_be_bytes([pair[0], pair[1]]),
                        _ => u16::from_le_bytes([pair[0], pair[1]]),
                    })
                    .collect();
                let units = units.strip_prefix(&[0xFEFF]).unwrap_or(&units);
                String::from_utf16(units).map_err(|_| malformed())
            }
            Charset::Ascii => {
                if bytes.is_ascii() {
                    Ok(bytes.iter().map(|&b| b as char).collect())
                } else {
                    Err(malformed())
                }
            }
            Charset::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// Resolves the charset for a payload: an explicit `charset` parameter wins,
/// otherwise the format default applies. Every format this crate knows
/// defaults to UTF-8.
pub fn resolve_encoding(
    media_type: Option<&MediaType>,
    format: PayloadFormat,
) -> Result<Charset, ODataError> {
    if let Some(charset) = media_type.and_then(|m| m.parameter("charset")) {
        return Charset::from_name(charset);
    }
    Ok(default_charset(format))
}

fn default_charset(format: PayloadFormat) -> Charset {
    match format {
        PayloadFormat::Atom | PayloadFormat::VerboseJson | PayloadFormat::JsonLight => Charset::Utf8,
    }
}

/// Parses a content type and resolves both the format and the charset.
pub fn resolve_content_type(content_type: &str) -> Result<(PayloadFormat, Charset), ODataError> {
    let media_type = MediaType::parse(content_type)?;
    let format = media_type.format().ok_or_else(|| {
        ODataError::from(StructuralError::InvalidMediaType {
            media_type: content_type.to_string(),
            reason: "no OData payload format is registered for it".to_string(),
        })
    })?;
    let charset = resolve_encoding(Some(&media_type), format)?;
    Ok((format, charset))
}
