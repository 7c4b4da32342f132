//! # Rivet OpenAPI
//!
//! Schema derivation from type descriptors and the OpenAPI 3.1 document model.
//!
//! Types describe their shape once with [`Describe`]; a [`SchemaRegistry`]
//! derives schemas from those shapes and stores named types in an append-only
//! component table, so the same type always resolves to the same reference.

mod components;
mod describe;
mod registry;
mod schema;
mod spec;

pub use components::{ComponentConflict, ComponentTable};
pub use describe::{
    Describe, FieldShape, RecordBuilder, RecordShape, SequenceShape, Shape, StringShape, TypeRef,
};
pub use registry::{NamingStyle, SchemaError, SchemaRegistry};
pub use schema::{AdditionalProperties, Properties, Schema, SchemaKind, SchemaType};
pub use spec::{
    status_key, Components, Document, DocumentError, Info, MediaType, Operation, Parameter,
    ParameterLocation, PathItem, RefOr, RequestBody, Response, SecurityRequirementDoc,
    SecurityScheme, Server, Tag,
};
