//! One-call entry points over the readers and writers.
//!
//! Readers take the raw payload bytes and its content type; the format and
//! charset in the content type override the ones in the settings.

use crate::collection_reader::ODataCollectionReader;
use crate::deserializer::JsonDeserializer;
use crate::edm::{CoreTypeResolver, TypeReference};
use crate::entry_writer::ODataEntryWriter;
use crate::collection_writer::ODataCollectionWriter;
use crate::error::ODataError;
use crate::json::{BufferingJsonReader, TokenSource};
use crate::media_type::resolve_content_type;
use crate::model::{CollectionValue, ODataEntry, ODataValue};
use crate::parameter_reader::{ODataParameterReader, ODataParameterReaderState};
use crate::settings::{ReaderSettings, WriterSettings};
use futures::io::{AsyncRead, AsyncWrite};

/// A collection payload read to the end.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadCollection {
    /// `Collection(T)` as announced by the payload, if it was.
    pub type_name: Option<String>,
    pub item_type_name: Option<String>,
    pub items: Vec<ODataValue>,
}

/// Reads every item of a collection payload.
///
/// # Errors
///
/// Returns an `ODataError` if the content type cannot be resolved, the
/// bytes cannot be decoded, or the payload is not a valid collection.
pub fn read_collection(
    payload: &[u8],
    content_type: &str,
    settings: &ReaderSettings,
    expected_item_type: Option<TypeReference>,
) -> Result<ReadCollection, ODataError> {
    let (settings, source) = prepare_source(payload, content_type, settings)?;
    let mut reader = ODataCollectionReader::new(source, &settings, expected_item_type);
    let mut items = Vec::new();
    while reader.read()? {
        if let Some(item) = reader.item() {
            items.push(item.clone());
        }
    }
    Ok(finish_collection(&reader, items))
}

/// [`read_collection`] over a stream.
pub async fn read_collection_async<R>(
    stream: R,
    content_type: &str,
    settings: &ReaderSettings,
    expected_item_type: Option<TypeReference>,
) -> Result<ReadCollection, ODataError>
where
    R: AsyncRead + Send + 'static,
{
    let (format, charset) = resolve_content_type(content_type)?;
    let settings = ReaderSettings {
        format,
        ..settings.clone()
    };
    let source = BufferingJsonReader::from_async_read(stream, charset).with_max_depth(settings.max_nesting_depth);
    let mut reader = ODataCollectionReader::new(source, &settings, expected_item_type);
    let mut items = Vec::new();
    while reader.read_async().await? {
        if let Some(item) = reader.item() {
            items.push(item.clone());
        }
    }
    Ok(finish_collection(&reader, items))
}

/// Reads the parameters of an operation invocation. Collection parameters
/// are returned as [`ODataValue::Collection`].
///
/// # Errors
///
/// Returns an `ODataError` if the payload is malformed, repeats a
/// parameter, or does not match `signature`.
pub fn read_parameters(
    payload: &[u8],
    content_type: &str,
    settings: &ReaderSettings,
    signature: Option<Vec<(String, TypeReference)>>,
) -> Result<Vec<(String, ODataValue)>, ODataError> {
    let (settings, source) = prepare_source(payload, content_type, settings)?;
    let mut reader = ODataParameterReader::new(source, &settings, signature);
    let mut parameters = Vec::new();
    while reader.read()? {
        let name = reader.name().unwrap_or_default().to_string();
        match reader.state() {
            ODataParameterReaderState::Collection => {
                let mut items = Vec::new();
                let mut collection = reader.create_collection_reader()?;
                while collection.read()? {
                    if let Some(item) = collection.item() {
                        items.push(item.clone());
                    }
                }
                let type_name = collection.item_type_name().map(crate::edm::collection_type_name);
                parameters.push((
                    name,
                    ODataValue::Collection(CollectionValue::new(type_name.as_deref(), items)),
                ));
            }
            _ => {
                let value = reader.value().cloned().unwrap_or(ODataValue::Null);
                parameters.push((name, value));
            }
        }
    }
    Ok(parameters)
}

/// Reads a single entry payload.
pub fn read_entry(payload: &[u8], content_type: &str, settings: &ReaderSettings) -> Result<ODataEntry, ODataError> {
    let (settings, mut source) = prepare_source(payload, content_type, settings)?;
    JsonDeserializer::new(settings, &CoreTypeResolver).read_entry_payload(&mut source)
}

/// Reads a feed payload into its entries.
pub fn read_feed(
    payload: &[u8],
    content_type: &str,
    settings: &ReaderSettings,
) -> Result<Vec<ODataEntry>, ODataError> {
    let (settings, mut source) = prepare_source(payload, content_type, settings)?;
    JsonDeserializer::new(settings, &CoreTypeResolver).read_feed_payload(&mut source)
}

/// Writes a complete collection payload and returns its text.
///
/// # Errors
///
/// Returns an `ODataError` if an item does not fit the collection or the
/// format is not writable.
pub fn write_collection(
    settings: &WriterSettings,
    type_name: Option<&str>,
    expected_item_type: Option<TypeReference>,
    items: &[ODataValue],
) -> Result<String, ODataError> {
    let writer = build_collection(settings, type_name, expected_item_type, items)?;
    Ok(writer.output().to_string())
}

/// [`write_collection`] into an asynchronous sink.
pub async fn write_collection_async<W>(
    output: &mut W,
    settings: &WriterSettings,
    type_name: Option<&str>,
    expected_item_type: Option<TypeReference>,
    items: &[ODataValue],
) -> Result<(), ODataError>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut writer = build_collection(settings, type_name, expected_item_type, items)?;
    writer.flush_async(output).await
}

/// Writes an entry with its navigation properties.
pub fn write_entry(settings: &WriterSettings, entry: &ODataEntry) -> Result<String, ODataError> {
    let mut writer = ODataEntryWriter::new(settings);
    writer.write_entry(entry)?;
    Ok(writer.output().to_string())
}

pub fn write_feed(settings: &WriterSettings, entries: &[ODataEntry]) -> Result<String, ODataError> {
    let mut writer = ODataEntryWriter::new(settings);
    writer.write_start_feed()?;
    for entry in entries {
        writer.write_entry(entry)?;
    }
    writer.write_end()?;
    Ok(writer.output().to_string())
}

fn prepare_source(
    payload: &[u8],
    content_type: &str,
    settings: &ReaderSettings,
) -> Result<(ReaderSettings, BufferingJsonReader), ODataError> {
    let (format, charset) = resolve_content_type(content_type)?;
    let text = charset.decode(payload)?;
    let settings = ReaderSettings {
        format,
        ..settings.clone()
    };
    let source = BufferingJsonReader::new(&text).with_max_depth(settings.max_nesting_depth);
    Ok((settings, source))
}

fn finish_collection<S: TokenSource>(reader: &ODataCollectionReader<'_, S>, items: Vec<ODataValue>) -> ReadCollection {
    ReadCollection {
        type_name: reader.collection_type_name().map(str::to_string),
        item_type_name: reader.item_type_name().map(str::to_string),
        items,
    }
}

fn build_collection(
    settings: &WriterSettings,
    type_name: Option<&str>,
    expected_item_type: Option<TypeReference>,
    items: &[ODataValue],
) -> Result<ODataCollectionWriter<'static>, ODataError> {
    let mut writer = ODataCollectionWriter::new(settings, expected_item_type);
    writer.write_start(type_name)?;
    for item in items {
        writer.write_item(item)?;
    }
    writer.write_end()?;
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrimitiveValue;
    use crate::settings::PayloadFormat;

    const JSON_LIGHT: &str = "application/json;odata=minimalmetadata";

    #[test]
    fn test_read_collection_from_bytes() {
        let payload = br#"{"odata.metadata":"http://h/$metadata#Collection(Edm.String)","value":["a","b"]}"#;
        let read = read_collection(payload, JSON_LIGHT, &ReaderSettings::default(), None).unwrap();
        assert_eq!(read.type_name.as_deref(), Some("Collection(Edm.String)"));
        assert_eq!(read.item_type_name.as_deref(), Some("Edm.String"));
        assert_eq!(
            read.items,
            vec![
                ODataValue::Primitive(PrimitiveValue::String("a".into())),
                ODataValue::Primitive(PrimitiveValue::String("b".into())),
            ]
        );
    }

    #[test]
    fn test_content_type_selects_format() {
        let payload = br#"{"d":[1,2]}"#;
        let settings = ReaderSettings {
            format: PayloadFormat::JsonLight,
            ..ReaderSettings::default()
        };
        let read = read_collection(payload, "application/json;odata=verbose", &settings, None).unwrap();
        assert_eq!(read.items.len(), 2);
    }

    #[test]
    fn test_unknown_content_type_is_rejected() {
        assert!(read_collection(b"{}", "text/plain", &ReaderSettings::default(), None).is_err());
    }

    #[test]
    fn test_write_collection_returns_text() {
        let text = write_collection(
            &WriterSettings::default(),
            None,
            None,
            &[ODataValue::Primitive(PrimitiveValue::Boolean(true))],
        )
        .unwrap();
        assert_eq!(text, r#"{"value":[true]}"#);
    }
}
