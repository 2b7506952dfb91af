pub mod api;
pub mod collection_reader;
pub mod collection_validator;
pub mod collection_writer;
pub mod deserializer;
pub mod duplicate_checker;
pub mod edm;
pub mod entry_writer;
pub mod error;
pub mod json;
pub mod media_type;
pub mod model;
pub mod parameter_reader;
pub mod serializer;
pub mod settings;
pub mod type_name_oracle;
pub mod utils;

pub use api::{
    read_collection, read_collection_async, read_entry, read_feed, read_parameters, write_collection,
    write_collection_async, write_entry, write_feed, ReadCollection,
};
pub use collection_reader::{ODataCollectionReader, ODataCollectionReaderState};
pub use collection_validator::CollectionWithoutExpectedTypeValidator;
pub use collection_writer::{ODataCollectionWriter, ODataCollectionWriterState};
pub use duplicate_checker::{DuplicatePropertyNamesChecker, PropertyAnnotationCollector};
pub use edm::{CoreTypeResolver, PrimitiveTypeKind, TypeKind, TypeReference, TypeResolver};
pub use entry_writer::{ODataEntryWriter, ODataEntryWriterState};
pub use error::{ErrorCategory, ODataError};
pub use model::{ODataEntry, ODataNavigationLink, ODataProperty, ODataValue};
pub use parameter_reader::{ODataParameterReader, ODataParameterReaderState};
pub use settings::{ODataVersion, PayloadFormat, ReaderSettings, WriterSettings};
pub use type_name_oracle::TypeNameOracle;
