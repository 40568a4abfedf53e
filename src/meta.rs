//! Self-description: the algebra written in itself.
//!
//! `TYPE_TYPE` describes every term shape, so any `Type` reinterpreted as data
//! conforms to it, `TYPE_TYPE` included. `SCHEMA_TYPE` does the same for
//! whole `Schema` documents.
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use crate::check::Checker;
use crate::codec::{ConfigError, DecodeError, Schema, decoder};
use crate::path_de::{PathError, from_value_with_path};
use crate::types::{Bindings, Type};

pub static DATA_TYPE: Lazy<Type> = Lazy::new(build_data_type);
static TYPE_BINDINGS: Lazy<Bindings> = Lazy::new(build_type_bindings);
pub static TYPE_TYPE: Lazy<Type> =
    Lazy::new(|| Type::let_in(type_bindings().clone(), Type::reference("type")));
pub static SCHEMA_TYPE: Lazy<Type> = Lazy::new(build_schema_type);

/// Any JSON-like value.
pub fn data_type() -> &'static Type {
    &DATA_TYPE
}

/// Any type term.
pub fn type_type() -> &'static Type {
    &TYPE_TYPE
}

/// Any schema document.
pub fn schema_type() -> &'static Type {
    &SCHEMA_TYPE
}

/// The schema of schemas.
pub fn json_schema(meta: Option<Value>) -> Schema {
    let meta = meta.unwrap_or_else(|| Value::Object(Map::new()));
    Schema::json_with_meta(schema_type().clone(), meta)
}

/// Reinterpret a type term as generic data (its wire shape).
pub fn type_as_data(t: &Type) -> serde_json::Result<Value> {
    serde_json::to_value(t)
}

pub fn schema_as_data(schema: &Schema) -> serde_json::Result<Value> {
    serde_json::to_value(schema)
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("not a schema document: {0}")]
    Decode(#[from] DecodeError),
    #[error("malformed schema document {0}")]
    Shape(#[from] PathError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Read a schema document: decode it through the schema of schemas, then
/// build the typed `Schema`.
pub fn parse_schema(text: &str) -> Result<Schema, SchemaError> {
    parse_schema_with(text, Checker::default())
}

/// [`parse_schema`] with the document checked under `checker`'s depth guard.
pub fn parse_schema_with(text: &str, checker: Checker) -> Result<Schema, SchemaError> {
    let meta_schema = json_schema(None);
    let decoded = decoder(&meta_schema)?.with_checker(checker).decode(text)?;
    Ok(from_value_with_path::<Schema>(decoded.term)?)
}

// ------------------------------ Builders ---------------------------------- //

fn data_union() -> Type {
    Type::union([
        Type::string(),
        Type::float(),
        Type::int(),
        Type::bool(),
        Type::null(),
        Type::map(Type::string(), Type::reference("data")),
        Type::list(Type::reference("data")),
    ])
}

fn build_data_type() -> Type {
    Type::let_in([("data", data_union())], Type::reference("data"))
}

/// One struct per variant: `kind` discriminator, payload fields, optional meta.
fn variant<K: Into<String>>(tag: &str, fields: impl IntoIterator<Item = (K, Type)>) -> Type {
    let mut all = vec![("kind".to_string(), Type::literal(tag))];
    all.extend(fields.into_iter().map(|(k, t)| (k.into(), t)));
    all.push(("meta".to_string(), Type::reference("maybe-data")));
    Type::structure(all)
}

fn build_type_bindings() -> Bindings {
    let sub = Type::union(
        ["void", "null", "bool", "int", "float", "string"].map(Type::literal),
    );
    let ty = || Type::reference("type");

    [
        (
            "type",
            Type::union(
                ["basic", "literal", "union", "struct", "map", "list", "tuple", "let", "ref"]
                    .map(Type::reference),
            ),
        ),
        ("basic", variant("type-basic", [("sub", sub)])),
        ("literal", variant("type-literal", [("value", Type::reference("data"))])),
        ("union", variant("type-union", [("alts", Type::list(ty()))])),
        ("struct", variant("type-struct", [("fields", Type::map(Type::string(), ty()))])),
        ("map", variant("type-map", [("key", ty()), ("value", ty())])),
        ("list", variant("type-list", [("value", ty())])),
        ("tuple", variant("type-tuple", [("fields", Type::list(ty()))])),
        (
            "let",
            variant("type-let", [("bindings", Type::map(Type::string(), ty())), ("t", ty())]),
        ),
        ("ref", variant("type-ref", [("name", Type::string())])),
        ("maybe-data", Type::maybe(Type::reference("data"))),
        ("data", data_union()),
    ]
    .into_iter()
    .map(|(name, t)| (name.to_string(), t))
    .collect()
}

fn build_schema_type() -> Type {
    Type::structure([
        ("t", type_type().clone()),
        ("version", Type::union([Type::literal(crate::codec::SCHEMA_VERSION)])),
        ("encoding", Type::union([Type::literal("json")])),
        ("meta", data_type().clone()),
    ])
}

/// Bindings of the bootstrap `Let`, for callers resolving names like `"type"`.
pub fn type_bindings() -> &'static Bindings {
    &TYPE_BINDINGS
}

// ------------------------------- Tests ------------------------------------ //
