//! Describe JSON-encodable data shapes as values, check data against them,
//! and encode/decode through a type-checking gate.
pub mod check;
pub mod codec;
pub mod data;
pub mod env;
pub mod meta;
pub mod path_de;
pub mod types;

pub use check::{Checker, DEFAULT_MAX_DEPTH, TypeError, typecheck, typecheck_in};
pub use codec::{
    ConfigError, DecodeError, Decoded, Decoder, EncodeError, Encoder, Encoding, SCHEMA_VERSION,
    Schema, decoder, encoder,
};
pub use env::Env;
pub use meta::{
    SchemaError, data_type, json_schema, parse_schema, parse_schema_with, schema_as_data,
    schema_type, type_as_data, type_type,
};
pub use types::{Basic, Bindings, MetaData, Type, TypeKind};
