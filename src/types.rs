//! The type algebra: a closed set of terms describing JSON-encodable data.
//!
//! Terms form an owned tree. Recursion is expressed with `Let` + `Ref`: a `Ref`
//! is a name, resolved through the checking environment, never a pointer back
//! into the tree.
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Named type bindings, kept in declaration order.
pub type Bindings = IndexMap<String, Type>;

/// Attached metadata (UI hints, numeric bounds, ...). Never affects checking.
pub type MetaData = Value;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Type {
    #[serde(flatten)]
    pub kind: TypeKind,
    #[serde(
        default,
        deserialize_with = "present_meta",
        skip_serializing_if = "Option::is_none"
    )]
    pub meta: Option<MetaData>,
}

/// Wire shape: an object with a `kind` discriminator plus the variant fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TypeKind {
    #[serde(rename = "type-basic")]
    Basic { sub: Basic },
    #[serde(rename = "type-literal")]
    Literal { value: Value },
    /// Wire documents must list at least one alternative.
    #[serde(rename = "type-union")]
    Union {
        #[serde(deserialize_with = "non_empty_alts")]
        alts: Vec<Type>,
    },
    /// Field order is the order fields are checked in.
    #[serde(rename = "type-struct")]
    Struct { fields: IndexMap<String, Type> },
    #[serde(rename = "type-map")]
    Map { key: Box<Type>, value: Box<Type> },
    #[serde(rename = "type-list")]
    List { value: Box<Type> },
    #[serde(rename = "type-tuple")]
    Tuple { fields: Vec<Type> },
    #[serde(rename = "type-let")]
    Let { bindings: Bindings, t: Box<Type> },
    #[serde(rename = "type-ref")]
    Ref { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basic {
    /// Only the missing marker.
    Void,
    Null,
    Bool,
    /// Any number.
    Int,
    /// Any number.
    Float,
    String,
}

// An explicit `"meta": null` is still metadata.
fn present_meta<'de, D>(de: D) -> Result<Option<MetaData>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(de).map(Some)
}

fn non_empty_alts<'de, D>(de: D) -> Result<Vec<Type>, D::Error>
where
    D: Deserializer<'de>,
{
    let alts = Vec::<Type>::deserialize(de)?;
    if alts.is_empty() {
        return Err(serde::de::Error::invalid_length(0, &"at least one alternative"));
    }
    Ok(alts)
}

// ————————————————————————————————————————————————————————————————————————————
// CONSTRUCTORS
// ————————————————————————————————————————————————————————————————————————————

impl From<TypeKind> for Type {
    fn from(kind: TypeKind) -> Self {
        Self { kind, meta: None }
    }
}

impl Type {
    pub fn basic(sub: Basic) -> Self {
        TypeKind::Basic { sub }.into()
    }

    /// Accepts only the missing marker.
    pub fn void() -> Self {
        Self::basic(Basic::Void)
    }

    pub fn null() -> Self {
        Self::basic(Basic::Null)
    }

    pub fn bool() -> Self {
        Self::basic(Basic::Bool)
    }

    /// Any number. Integrality is not enforced.
    pub fn int() -> Self {
        Self::basic(Basic::Int)
    }

    pub fn float() -> Self {
        Self::basic(Basic::Float)
    }

    pub fn string() -> Self {
        Self::basic(Basic::String)
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        TypeKind::Literal { value: value.into() }.into()
    }

    /// An empty `alts` is accepted here and never conforms.
    pub fn union(alts: impl IntoIterator<Item = Type>) -> Self {
        TypeKind::Union { alts: alts.into_iter().collect() }.into()
    }

    pub fn structure<K: Into<String>>(fields: impl IntoIterator<Item = (K, Type)>) -> Self {
        let fields = fields.into_iter().map(|(k, t)| (k.into(), t)).collect();
        TypeKind::Struct { fields }.into()
    }

    pub fn map(key: Type, value: Type) -> Self {
        TypeKind::Map { key: Box::new(key), value: Box::new(value) }.into()
    }

    pub fn list(value: Type) -> Self {
        TypeKind::List { value: Box::new(value) }.into()
    }

    pub fn tuple(fields: impl IntoIterator<Item = Type>) -> Self {
        TypeKind::Tuple { fields: fields.into_iter().collect() }.into()
    }

    /// Bind names for the evaluation of `body`; inner bindings shadow outer ones.
    pub fn let_in<K: Into<String>>(
        bindings: impl IntoIterator<Item = (K, Type)>,
        body: Type,
    ) -> Self {
        let bindings = bindings.into_iter().map(|(k, t)| (k.into(), t)).collect();
        TypeKind::Let { bindings, t: Box::new(body) }.into()
    }

    pub fn reference(name: impl Into<String>) -> Self {
        TypeKind::Ref { name: name.into() }.into()
    }

    /// `t` or absent.
    pub fn maybe(t: Type) -> Self {
        Self::union([t, Self::void()])
    }

    pub fn with_meta(mut self, meta: impl Into<MetaData>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Basic { sub: Basic::Void })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DISPLAY
// ————————————————————————————————————————————————————————————————————————————

impl TypeKind {
    /// The wire discriminator of this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            TypeKind::Basic { .. } => "type-basic",
            TypeKind::Literal { .. } => "type-literal",
            TypeKind::Union { .. } => "type-union",
            TypeKind::Struct { .. } => "type-struct",
            TypeKind::Map { .. } => "type-map",
            TypeKind::List { .. } => "type-list",
            TypeKind::Tuple { .. } => "type-tuple",
            TypeKind::Let { .. } => "type-let",
            TypeKind::Ref { .. } => "type-ref",
        }
    }
}

impl fmt::Display for Basic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Basic::Void => "void",
            Basic::Null => "null",
            Basic::Bool => "bool",
            Basic::Int => "int",
            Basic::Float => "float",
            Basic::String => "string",
        };
        f.write_str(name)
    }
}

/// Shallow, one-line rendering used in diagnostics.
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Basic { sub } => write!(f, "{sub}"),
            TypeKind::Literal { value } => write!(f, "literal {value}"),
            TypeKind::Union { alts } => write!(f, "union of {}", alts.len()),
            TypeKind::Struct { fields } => {
                let names = fields.keys().map(String::as_str).collect::<Vec<_>>();
                write!(f, "struct {{{}}}", names.join(", "))
            }
            TypeKind::Map { key, value } => write!(f, "map {key} -> {value}"),
            TypeKind::List { value } => write!(f, "list of {value}"),
            TypeKind::Tuple { fields } => write!(f, "tuple of {}", fields.len()),
            TypeKind::Let { bindings, t } => {
                let names = bindings.keys().map(String::as_str).collect::<Vec<_>>();
                write!(f, "let {} in {t}", names.join(", "))
            }
            TypeKind::Ref { name } => write!(f, "ref {name}"),
        }
    }
}

// ------------------------------- Tests ------------------------------------ //
