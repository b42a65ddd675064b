//! Wire-shaped backing store for typed instances.
//!
//! A [`TypedInstance`] keeps its fields exactly as they appear on the wire,
//! so encoding is a plain conversion of the store. Reads, writes and deletes
//! go through the declared field table:
//!
//! | field     | get                 | set(null)                      | delete        |
//! |-----------|---------------------|--------------------------------|---------------|
//! | required  | stored value        | coerced; fails unless nullable | error         |
//! | optional  | stored value / null | no-op while absent             | remove / no-op|
//! | undeclared| wire extra/detached | detached side map              | remove / error|
//!
//! Undeclared keys that came from the wire stay in the store and are encoded
//! again. Undeclared names set through [`TypedInstance::set`] land in a
//! detached side map that is never encoded.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::decode::{Decoder, RawMap};
use crate::error::{Error, Result};
use crate::fields::ObjectType;
use crate::path_de::{self, PathError};
use crate::registry::Registry;
use crate::shadow::unshadow;
use crate::value::Value;

static NULL: Value = Value::Null;

#[derive(Clone)]
pub struct TypedInstance {
    registry: Registry,
    ty: Arc<ObjectType>,
    wire: IndexMap<String, Value>,
    detached: IndexMap<String, Value>,
}

impl TypedInstance {
    pub(crate) fn from_parts(registry: Registry, ty: Arc<ObjectType>, wire: IndexMap<String, Value>) -> Self {
        Self { registry, ty, wire, detached: IndexMap::new() }
    }

    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    pub fn object_type(&self) -> &ObjectType {
        &self.ty
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The wire-shaped store, in wire order.
    pub fn wire(&self) -> &IndexMap<String, Value> {
        &self.wire
    }

    /// Caller-set values for undeclared names. Never encoded.
    pub fn detached(&self) -> &IndexMap<String, Value> {
        &self.detached
    }

    /// Reads a field by attribute name (`type_`) or wire name (`type`).
    /// Absent optional fields read as null.
    ///
    /// Declared fields win: with `type` declared, `get("type_")` is always the
    /// `type` field, and a wire extra literally keyed `type_` is only
    /// reachable through [`TypedInstance::wire`]. It is still encoded.
    pub fn get(&self, attr: &str) -> Result<&Value> {
        if let Some(field) = self.ty.lookup(attr) {
            return Ok(self.wire.get(&field.wire_name).unwrap_or(&NULL));
        }
        self.extra_key(attr)
            .and_then(|key| self.wire.get(&key))
            .or_else(|| self.detached.get(attr))
            .ok_or_else(|| self.unknown(attr))
    }

    pub fn contains(&self, attr: &str) -> bool {
        match self.ty.lookup(attr) {
            Some(field) => self.wire.contains_key(&field.wire_name),
            None => self.extra_key(attr).is_some() || self.detached.contains_key(attr),
        }
    }

    pub fn set(&mut self, attr: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let ty = Arc::clone(&self.ty);
        let Some(field) = ty.lookup(attr) else {
            return self.set_undeclared(attr, value);
        };

        if !field.required && value.is_null() {
            // never-set optional fields stay absent; a set one is cleared to null
            if let Some(slot) = self.wire.get_mut(&field.wire_name) {
                *slot = Value::Null;
            }
            return Ok(());
        }

        let mut decoder = Decoder::new(&self.registry);
        let coerced = decoder.coerce_field(field, value)?;
        self.wire.insert(field.wire_name.clone(), coerced);
        Ok(())
    }

    fn set_undeclared(&mut self, attr: &str, value: Value) -> Result<()> {
        if let Some(slot) = self.extra_key(attr).and_then(|key| self.wire.get_mut(&key)) {
            // an extra that arrived on the wire stays wire data
            *slot = value;
            return Ok(());
        }
        tracing::warn!(
            type_name = self.ty.name(),
            field = attr,
            "no such field; value kept out of band and will not be encoded"
        );
        self.detached.insert(attr.to_string(), value);
        Ok(())
    }

    pub fn delete(&mut self, attr: &str) -> Result<()> {
        if let Some(field) = self.ty.lookup(attr) {
            if field.required {
                return Err(Error::RequiredField {
                    type_name: self.ty.name().to_string(),
                    field: field.wire_name.clone(),
                });
            }
            self.wire.shift_remove(&field.wire_name);
            return Ok(());
        }
        if let Some(key) = self.extra_key(attr) {
            self.wire.shift_remove(&key);
            return Ok(());
        }
        if self.detached.shift_remove(attr).is_some() {
            return Ok(());
        }
        Err(self.unknown(attr))
    }

    /// Every readable attribute name: declared fields, wire extras, detached names.
    pub fn fields(&self) -> Vec<String> {
        let mut out: Vec<String> = self.ty.fields().map(|f| f.attr_name.clone()).collect();
        for key in self.wire.keys() {
            if self.ty.field(key).is_none() {
                out.push(crate::shadow::shadow(key));
            }
        }
        out.extend(self.detached.keys().cloned());
        out
    }

    pub fn encode(&self) -> RawMap {
        self.wire.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserializes the wire store into a static serde type.
    pub fn to_struct<T: DeserializeOwned>(&self) -> Result<T, PathError> {
        path_de::from_value_with_path(serde_json::Value::Object(self.encode()))
    }

    /// Wire entries minus optional fields holding null, which decode back to absent.
    fn significant(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.wire
            .iter()
            .filter(|(k, v)| !(v.is_null() && self.ty.field(k).is_some_and(|f| !f.required)))
    }

    /// Wire key of an undeclared extra: the unshadowed name, else the name as given.
    fn extra_key(&self, attr: &str) -> Option<String> {
        let wire_name = unshadow(attr);
        if self.wire.contains_key(&wire_name) {
            Some(wire_name)
        } else if self.wire.contains_key(attr) {
            Some(attr.to_string())
        } else {
            None
        }
    }

    fn unknown(&self, attr: &str) -> Error {
        Error::UnknownField { type_name: self.ty.name().to_string(), field: attr.to_string() }
    }
}

impl PartialEq for TypedInstance {
    /// An optional field holding null equals the field being absent.
    fn eq(&self, other: &Self) -> bool {
        self.ty.name() == other.ty.name()
            && self.significant().count() == other.significant().count()
            && self.significant().all(|(k, v)| other.wire.get(k) == Some(v))
    }
}

impl fmt::Debug for TypedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.ty.name());
        for (k, v) in &self.wire {
            s.field(k, v);
        }
        if !self.detached.is_empty() {
            s.field("<detached>", &self.detached);
        }
        s.finish()
    }
}

impl fmt::Display for TypedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "{}({body})", self.ty.name())
    }
}

impl Serialize for TypedInstance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.wire.len()))?;
        for (k, v) in &self.wire {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DIRECT CONSTRUCTION
// ————————————————————————————————————————————————————————————————————————————

/// Builds an outgoing instance from field values without a raw map.
/// Obtained from [`Registry::instance`].
#[derive(Debug)]
pub struct InstanceBuilder {
    registry: Registry,
    ty: Arc<ObjectType>,
    values: IndexMap<String, Value>,
}

impl InstanceBuilder {
    pub(crate) fn new(registry: Registry, ty: Arc<ObjectType>) -> Self {
        Self { registry, ty, values: IndexMap::new() }
    }

    /// Supplies a field by attribute or wire name; later values win.
    pub fn with(mut self, attr: &str, value: impl Into<Value>) -> Self {
        let key = match self.ty.lookup(attr) {
            Some(field) => field.wire_name.clone(),
            None => attr.to_string(),
        };
        self.values.insert(key, value.into());
        self
    }

    pub fn build(mut self) -> Result<TypedInstance> {
        let missing = self.ty.missing_required(|k| self.values.contains_key(k));
        if !missing.is_empty() {
            return Err(Error::MissingFields { type_name: self.ty.name().to_string(), missing });
        }

        let mut inst = TypedInstance::from_parts(self.registry, Arc::clone(&self.ty), IndexMap::new());
        for field in self.ty.fields() {
            if let Some(v) = self.values.shift_remove(&field.wire_name) {
                inst.set(&field.attr_name, v)?;
            }
        }
        for (name, v) in self.values {
            inst.set(&name, v)?;
        }
        Ok(inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::RawMap;
    use crate::ir::Ty;
    use serde_json::json;

    fn registry() -> Registry {
        let mut b = Registry::builder();
        b.register(ObjectType::builder("User")
            .required("id", Ty::int())
            .required("first_name", Ty::str())
            .optional("username", Ty::str())
            .build().unwrap()).unwrap();
        b.register(ObjectType::builder("Message")
            .required("message_id", Ty::int())
            .optional("from", Ty::object("User"))
            .optional("type", Ty::str())
            .required("reply_markup", Ty::optional(Ty::Any))
            .build().unwrap()).unwrap();
        b.build()
    }

    fn user(reg: &Registry) -> TypedInstance {
        reg.decode_value("User", &json!({"id": 1, "first_name": "Ada"})).unwrap()
    }

    #[test]
    fn get_follows_declared_optional_and_unknown_rules() {
        let reg = registry();
        let u = user(&reg);
        assert_eq!(u.get("id").unwrap().as_i64(), Some(1));
        assert_eq!(u.get("username").unwrap(), &Value::Null);
        assert_eq!(
            u.get("nickname").unwrap_err(),
            Error::UnknownField { type_name: "User".into(), field: "nickname".into() }
        );
    }

    #[test]
    fn optional_null_while_absent_is_a_no_op() {
        let reg = registry();
        let mut u = user(&reg);
        u.set("username", Value::Null).unwrap();
        assert!(!u.contains("username"));
        assert!(!u.encode().contains_key("username"));

        u.set("username", "ada").unwrap();
        u.set("username", Value::Null).unwrap();
        assert!(u.contains("username"));
        assert_eq!(u.encode().get("username"), Some(&serde_json::Value::Null));
    }

    #[test]
    fn set_coerces_against_the_declared_type() {
        let reg = registry();
        let mut u = user(&reg);
        let err = u.set("username", 5).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref field, .. } if field == "$.username"));
        assert!(!u.contains("username"));

        // raw maps become instances on the way in
        let mut m = reg.instance("Message").unwrap()
            .with("message_id", 1)
            .with("reply_markup", Value::Null)
            .build().unwrap();
        m.set("from", Value::from(&json!({"id": 2, "first_name": "Bob"}))).unwrap();
        assert_eq!(m.get("from").unwrap().as_instance().unwrap().type_name(), "User");
    }

    #[test]
    fn required_null_depends_on_the_declared_type() {
        let reg = registry();
        let mut m = reg.decode_value("Message", &json!({"message_id": 1, "reply_markup": {"k": 1}})).unwrap();
        m.set("reply_markup", Value::Null).unwrap();
        assert_eq!(m.get("reply_markup").unwrap(), &Value::Null);
        assert!(m.contains("reply_markup"));

        assert!(matches!(m.set("message_id", Value::Null), Err(Error::TypeMismatch { .. })));
        assert_eq!(m.get("message_id").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn reserved_names_route_through_attributes() {
        let reg = registry();
        let mut m = reg.decode_value("Message", &json!({"message_id": 1, "reply_markup": null, "type": "text"})).unwrap();
        assert_eq!(m.get("type_").unwrap().as_str(), Some("text"));
        m.set("type_", "photo").unwrap();
        assert_eq!(m.encode().get("type"), Some(&json!("photo")));
        assert!(m.fields().contains(&"type_".to_string()));
    }

    #[test]
    fn undeclared_names_by_provenance() {
        let reg = registry();
        let mut u = reg.decode_value("User", &json!({"id": 1, "first_name": "Ada", "is_premium": true})).unwrap();
        // from the wire: readable and encoded
        assert_eq!(u.get("is_premium").unwrap().as_bool(), Some(true));
        u.set("is_premium", false).unwrap();
        assert_eq!(u.encode().get("is_premium"), Some(&json!(false)));

        // from the caller: readable, detached, never encoded
        u.set("note", "local").unwrap();
        assert_eq!(u.get("note").unwrap().as_str(), Some("local"));
        assert!(u.detached().contains_key("note"));
        assert!(!u.encode().contains_key("note"));
        assert_eq!(u.fields(), ["id", "first_name", "username", "is_premium", "note"]);

        u.delete("note").unwrap();
        u.delete("is_premium").unwrap();
        assert!(matches!(u.delete("note"), Err(Error::UnknownField { .. })));
    }

    #[test]
    fn literal_underscored_extras_stay_reachable() {
        let reg = registry();
        let mut u = reg.decode_value("User", &json!({"id": 1, "first_name": "Ada", "match_": 3})).unwrap();
        assert_eq!(u.get("match_").unwrap().as_i64(), Some(3));
        u.set("match_", 4).unwrap();
        assert_eq!(u.encode().get("match_"), Some(&json!(4)));
        assert!(u.detached().is_empty());
    }

    #[test]
    fn cleared_optional_fields_survive_a_round_trip() {
        let reg = registry();
        let mut u = reg.decode_value("User", &json!({"id": 1, "first_name": "Ada", "username": "ada"})).unwrap();
        u.set("username", Value::Null).unwrap();
        assert_eq!(u.encode().get("username"), Some(&serde_json::Value::Null));

        let again = reg.decode("User", &u.encode()).unwrap();
        assert!(!again.contains("username"));
        assert_eq!(again, u);
        assert_eq!(u, again);
        let grace = reg.decode_value("User", &json!({"id": 1, "first_name": "Grace"})).unwrap();
        assert_ne!(again, grace);
    }

    #[test]
    fn wire_extras_shadowed_by_declared_attributes() {
        let reg = registry();
        let m = reg
            .decode_value("Message", &json!({"message_id": 1, "reply_markup": null, "type": "text", "type_": "x"}))
            .unwrap();
        assert_eq!(m.get("type_").unwrap().as_str(), Some("text"));
        assert_eq!(m.wire().get("type_").and_then(Value::as_str), Some("x"));
        assert_eq!(m.encode().get("type_"), Some(&json!("x")));
    }

    #[test]
    fn delete_rules() {
        let reg = registry();
        let mut u = reg.decode_value("User", &json!({"id": 1, "first_name": "Ada", "username": "ada"})).unwrap();
        assert_eq!(
            u.delete("id").unwrap_err(),
            Error::RequiredField { type_name: "User".into(), field: "id".into() }
        );
        u.delete("username").unwrap();
        assert!(!u.contains("username"));
        // absent optional: no-op
        u.delete("username").unwrap();
    }

    #[test]
    fn builder_enforces_required_and_drops_optional_nulls() {
        let reg = registry();
        let err = reg.instance("User").unwrap().with("first_name", "Ada").build().unwrap_err();
        assert_eq!(err, Error::MissingFields { type_name: "User".into(), missing: vec!["id".into()] });

        let u = reg.instance("User").unwrap()
            .with("first_name", "Ada")
            .with("username", Option::<String>::None)
            .with("id", 7)
            .build()
            .unwrap();
        let expected: RawMap = match json!({"id": 7, "first_name": "Ada"}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        assert_eq!(u.encode(), expected);
        // declaration order on construction
        assert_eq!(u.to_json_string().unwrap(), r#"{"id":7,"first_name":"Ada"}"#);
    }

    #[test]
    fn builder_accepts_existing_instances() {
        let reg = registry();
        let from = user(&reg);
        let m = reg.instance("Message").unwrap()
            .with("message_id", 3)
            .with("from", from.clone())
            .with("reply_markup", Value::Null)
            .build()
            .unwrap();
        assert_eq!(m.get("from").unwrap().as_instance(), Some(&from));
        assert_eq!(
            m.to_string(),
            r#"Message({"message_id":3,"from":{"id":1,"first_name":"Ada"},"reply_markup":null})"#
        );
    }

    #[test]
    fn instances_convert_to_static_types() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct User {
            id: i64,
            first_name: String,
        }
        let reg = registry();
        let u: User = user(&reg).to_struct().unwrap();
        assert_eq!(u, User { id: 1, first_name: "Ada".into() });

        #[derive(serde::Deserialize, Debug)]
        #[allow(dead_code)]
        struct Strict {
            id: String,
        }
        let err = user(&reg).to_struct::<Strict>().unwrap_err();
        assert_eq!(err.path, "id");
    }
}
