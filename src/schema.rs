//! Object type declarations loaded from JSON files.
//!
//! ```json
//! {
//!   "limits": { "max_depth": 32 },
//!   "types": [
//!     { "name": "PhotoSize", "fields": [
//!       { "name": "file_id",   "type": "String" },
//!       { "name": "file_size", "type": "Integer", "description": "Optional. File size" }
//!     ] }
//!   ]
//! }
//! ```
//!
//! A field is optional when it says `"optional": true`, carries a `"default"`
//! (null included), or its description starts with `Optional`, which is how
//! the protocol documentation marks defaulted fields. A field without
//! `"type"` is `Any`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::decode::Limits;
use crate::error::{Error, TyParseError};
use crate::fields::ObjectType;
use crate::ir::Ty;
use crate::path_de::{self, PathError};
use crate::registry::{Registry, RegistryBuilder};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed schema file: {0}")]
    Parse(#[from] PathError),
    #[error("type `{type_name}`, field `{field}`: {source}")]
    FieldType {
        type_name: String,
        field: String,
        #[source]
        source: TyParseError,
    },
    #[error(transparent)]
    Registry(#[from] Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    #[serde(default)]
    pub limits: Option<Limits>,
    pub types: Vec<TypeDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDecl {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub name: String,
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, deserialize_with = "present")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// `"default": null` counts as a default, so keep presence apart from value.
fn present<'de, D: Deserializer<'de>>(de: D) -> Result<Option<serde_json::Value>, D::Error> {
    serde_json::Value::deserialize(de).map(Some)
}

impl FieldDecl {
    pub fn is_optional(&self) -> bool {
        self.optional
            || self.default.is_some()
            || self.description.as_deref().is_some_and(|d| d.trim_start().starts_with("Optional"))
    }
}

impl TypeDecl {
    pub fn to_object_type(&self) -> Result<ObjectType, SchemaError> {
        let mut builder = ObjectType::builder(&self.name);
        for field in &self.fields {
            let required = !field.is_optional();
            builder = match &field.ty {
                None => builder.untyped(&field.name, required),
                Some(expr) => {
                    let ty: Ty = expr.parse().map_err(|source| SchemaError::FieldType {
                        type_name: self.name.clone(),
                        field: field.name.clone(),
                        source,
                    })?;
                    if required {
                        builder.required(&field.name, ty)
                    } else {
                        builder.optional(&field.name, ty)
                    }
                }
            };
        }
        Ok(builder.build()?)
    }
}

impl SchemaFile {
    pub fn from_json_str(src: &str) -> Result<Self, SchemaError> {
        Ok(path_de::from_str_with_path(src)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SchemaError> {
        Ok(path_de::from_slice_with_path(bytes)?)
    }

    /// First pass: register every shape; references stay unresolved names.
    pub fn into_builder(self) -> Result<RegistryBuilder, SchemaError> {
        let mut builder = RegistryBuilder::new();
        if let Some(limits) = self.limits {
            builder.set_limits(limits);
        }
        for decl in &self.types {
            builder.register(decl.to_object_type()?)?;
        }
        Ok(builder)
    }

    pub fn into_registry(self) -> Result<Registry, SchemaError> {
        let registry = self.into_builder()?.build();
        for dangling in registry.dangling_refs() {
            tracing::warn!(
                type_name = %dangling.type_name,
                field = %dangling.field,
                target = %dangling.target,
                "field refers to an unregistered type; its values will pass through unconverted"
            );
        }
        tracing::debug!(types = registry.names().count(), "schema loaded");
        Ok(registry)
    }
}

pub fn load_str(src: &str) -> Result<Registry, SchemaError> {
    SchemaFile::from_json_str(src)?.into_registry()
}

pub fn load_path(path: impl AsRef<Path>) -> Result<Registry, SchemaError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| SchemaError::Io { path: path.to_path_buf(), source })?;
    SchemaFile::from_slice(&bytes)?.into_registry()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use serde_json::json;
    use std::io::Write;

    const TELEGRAM_ISH: &str = r#"{
        "limits": { "max_depth": 16 },
        "types": [
            { "name": "Update", "fields": [
                { "name": "update_id", "type": "Integer" },
                { "name": "message", "type": "Message", "description": "Optional. New incoming message" }
            ] },
            { "name": "Message", "fields": [
                { "name": "message_id", "type": "Integer" },
                { "name": "from", "type": "User", "optional": true },
                { "name": "chat", "type": "Chat" },
                { "name": "reply_to_message", "type": "'Message'", "default": null },
                { "name": "photo", "type": "Array of PhotoSize", "optional": true },
                { "name": "payload" }
            ] },
            { "name": "Chat", "fields": [
                { "name": "id", "type": "Integer" },
                { "name": "type", "type": "String" }
            ] },
            { "name": "User", "fields": [
                { "name": "id", "type": "Integer" },
                { "name": "first_name", "type": "String" }
            ] }
        ]
    }"#;

    #[test]
    fn loads_declarations_with_forward_references() {
        let reg = load_str(TELEGRAM_ISH).unwrap();
        assert_eq!(reg.limits().max_depth, 16);
        assert_eq!(reg.limits().max_nodes, Limits::default().max_nodes);

        let msg = reg.resolve("Message").unwrap();
        let required: Vec<_> = msg.required_fields().map(|f| f.wire_name.as_str()).collect();
        assert_eq!(required, ["message_id", "chat", "payload"]);
        assert_eq!(msg.field("payload").unwrap().ty, Ty::Any);
        assert_eq!(msg.field("reply_to_message").unwrap().ty, Ty::object("Message"));
        assert_eq!(reg.dangling_refs().len(), 1); // PhotoSize

        let update = reg.decode_value("Update", &json!({
            "update_id": 9,
            "message": {
                "message_id": 1, "chat": {"id": 1, "type": "private"}, "payload": [1],
                "from": {"id": 2, "first_name": "Ada"},
                "photo": [{"file_id": "x"}]
            }
        })).unwrap();
        let msg = update.get("message").unwrap().as_instance().unwrap();
        assert_eq!(msg.get("from").unwrap().as_instance().unwrap().type_name(), "User");
        assert_eq!(msg.get("photo").unwrap().to_json(), json!([{"file_id": "x"}]));
        assert_eq!(msg.get("reply_to_message").unwrap(), &Value::Null);
    }

    #[test]
    fn bad_type_expressions_name_the_field() {
        let src = r#"{"types": [{"name": "X", "fields": [{"name": "a", "type": "Sequence[int"}]}]}"#;
        match load_str(src) {
            Err(SchemaError::FieldType { type_name, field, .. }) => {
                assert_eq!((type_name.as_str(), field.as_str()), ("X", "a"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn structural_errors_carry_the_json_path() {
        let src = r#"{"types": [{"name": "X", "fields": [{"name": "a", "typo": "int"}]}]}"#;
        match load_str(src) {
            Err(SchemaError::Parse(e)) => assert!(e.path.starts_with("types[0].fields[0]"), "{}", e.path),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn duplicate_types_are_rejected() {
        let src = r#"{"types": [{"name": "X"}, {"name": "X"}]}"#;
        assert!(matches!(load_str(src), Err(SchemaError::Registry(Error::DuplicateType(_)))));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TELEGRAM_ISH.as_bytes()).unwrap();
        let reg = load_path(file.path()).unwrap();
        assert!(reg.contains("Update"));

        let missing = file.path().with_extension("nope");
        assert!(matches!(load_path(&missing), Err(SchemaError::Io { .. })));
    }
}
