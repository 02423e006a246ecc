//! Model metadata, registry, and record codec.

pub mod codec;
pub mod descriptor;
pub mod registry;

pub use codec::{generate_primary_key, Model};
pub use descriptor::{
    FieldDescriptor, FieldKind, FieldSpec, ModelBuilder, ModelDescriptor, SchemaError,
    StorageKind, DEFAULT_TAG_SEPARATOR,
};
pub use registry::ModelRegistry;
