//! Schemas and the encode/decode gate.
//!
//! Encoding checks before serializing, so a rejected value never produces
//! output. Decoding parses before checking, so the checker never sees
//! unparseable text.
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::check::{Checker, TypeError};
use crate::types::{MetaData, Type};

/// The only recognized schema version.
pub const SCHEMA_VERSION: &str = "0";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// A single encoded data format: a type term plus version, encoding and metadata.
///
/// `version` and `encoding` stay plain strings so that a schema read from the
/// wire can carry unknown tags; they are validated when an encoder or decoder
/// is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub t: Type,
    pub version: String,
    pub encoding: String,
    pub meta: MetaData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
}

/// Successful decode result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decoded {
    pub term: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "error")]
pub enum ConfigError {
    #[serde(rename = "unknown schema version")]
    #[error("unknown schema version {version:?}")]
    UnknownVersion { version: String },
    #[serde(rename = "unknown schema encoding")]
    #[error("unknown schema encoding {encoding:?}")]
    UnknownEncoding { encoding: String },
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("failed to serialize value: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// The input is not JSON; carries the raw text.
    #[error("invalid JSON: {reason}")]
    Malformed { data: String, reason: String },
    #[error(transparent)]
    Type(#[from] TypeError),
}

// ————————————————————————————————————————————————————————————————————————————
// SCHEMA
// ————————————————————————————————————————————————————————————————————————————

impl Schema {
    pub fn json(t: Type) -> Self {
        Self::json_with_meta(t, Value::Object(Default::default()))
    }

    pub fn json_with_meta(t: Type, meta: MetaData) -> Self {
        Self {
            t,
            version: SCHEMA_VERSION.to_string(),
            encoding: Encoding::Json.as_str().to_string(),
            meta,
        }
    }

    /// Validate version and encoding tags.
    pub fn config(&self) -> Result<Encoding, ConfigError> {
        if self.version != SCHEMA_VERSION {
            return Err(ConfigError::UnknownVersion { version: self.version.clone() });
        }
        self.encoding.parse()
    }
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
        }
    }
}

impl FromStr for Encoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Encoding::Json),
            other => Err(ConfigError::UnknownEncoding { encoding: other.to_string() }),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ENCODER / DECODER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub struct Encoder {
    t: Type,
    encoding: Encoding,
    checker: Checker,
}

#[derive(Debug, Clone)]
pub struct Decoder {
    t: Type,
    encoding: Encoding,
    checker: Checker,
}

/// Build an encoder for `schema`. No I/O happens on a config error.
pub fn encoder(schema: &Schema) -> Result<Encoder, ConfigError> {
    let encoding = schema.config()?;
    tracing::debug!(encoding = encoding.as_str(), "encoder ready");
    Ok(Encoder { t: schema.t.clone(), encoding, checker: Checker::default() })
}

/// Build a decoder for `schema`.
pub fn decoder(schema: &Schema) -> Result<Decoder, ConfigError> {
    let encoding = schema.config()?;
    tracing::debug!(encoding = encoding.as_str(), "decoder ready");
    Ok(Decoder { t: schema.t.clone(), encoding, checker: Checker::default() })
}

impl Encoder {
    pub fn with_checker(mut self, checker: Checker) -> Self {
        self.checker = checker;
        self
    }

    /// Type-check `value`, then serialize it to wire text.
    pub fn encode(&self, value: &Value) -> Result<String, EncodeError> {
        if let Err(err) = self.checker.check(Some(value), &self.t) {
            tracing::debug!(%err, "encode rejected");
            return Err(err.into());
        }
        match self.encoding {
            Encoding::Json => Ok(serde_json::to_string(value)?),
        }
    }
}

impl Decoder {
    pub fn with_checker(mut self, checker: Checker) -> Self {
        self.checker = checker;
        self
    }

    /// Parse `text`, then type-check the parsed value.
    pub fn decode(&self, text: &str) -> Result<Decoded, DecodeError> {
        let term = match self.encoding {
            Encoding::Json => match serde_json::from_str::<Value>(text) {
                Ok(x) => x,
                Err(error) => {
                    return Err(DecodeError::Malformed {
                        data: text.to_string(),
                        reason: error.to_string(),
                    });
                }
            },
        };
        self.accept(term)
    }

    /// Type-check an already parsed value.
    pub fn accept(&self, term: Value) -> Result<Decoded, DecodeError> {
        if let Err(err) = self.checker.check(Some(&term), &self.t) {
            tracing::debug!(%err, "decode rejected");
            return Err(err.into());
        }
        Ok(Decoded { term })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DIAGNOSTIC WIRE FORM
// ————————————————————————————————————————————————————————————————————————————

impl Serialize for EncodeError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EncodeError::Type(err) => err.serialize(serializer),
            EncodeError::Serialize(err) => {
                let mut out = serializer.serialize_struct("EncodeError", 2)?;
                out.serialize_field("error", "serialization failed")?;
                out.serialize_field("reason", &err.to_string())?;
                out.end()
            }
        }
    }
}

impl Serialize for DecodeError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DecodeError::Type(err) => err.serialize(serializer),
            DecodeError::Malformed { data, reason } => {
                let mut out = serializer.serialize_struct("DecodeError", 3)?;
                out.serialize_field("error", "invalid JSON")?;
                out.serialize_field("data", data)?;
                out.serialize_field("reason", reason)?;
                out.end()
            }
        }
    }
}

// ------------------------------- Tests ------------------------------------ //
