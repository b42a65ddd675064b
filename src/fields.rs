//! Field tables for declared object types.
//!
//! Each [`ObjectType`] is built once, at declaration time, into an ordered
//! table indexed by wire name and by attribute name, so field lookups during
//! decoding never re-derive anything.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::ir::Ty;
use crate::shadow::shadow;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub wire_name: String,
    pub attr_name: String,   // differs from wire_name only for reserved words
    pub ty: Ty,
    pub required: bool,      // no default in the declaration
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    name: String,
    /// Declaration order, keyed by wire name.
    fields: IndexMap<String, FieldSpec>,
    /// attribute name -> index into `fields`
    by_attr: IndexMap<String, usize>,
}

impl ObjectType {
    pub fn builder(name: impl Into<String>) -> ObjectBuilder {
        ObjectBuilder { name: name.into(), fields: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values().filter(|f| f.required)
    }

    pub fn optional_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values().filter(|f| !f.required)
    }

    pub fn field(&self, wire_name: &str) -> Option<&FieldSpec> {
        self.fields.get(wire_name)
    }

    pub fn field_by_attr(&self, attr_name: &str) -> Option<&FieldSpec> {
        self.by_attr
            .get(attr_name)
            .and_then(|&i| self.fields.get_index(i))
            .map(|(_, f)| f)
    }

    /// Looks a field up by attribute name, falling back to the wire name
    /// so callers may pass either `from_`-style or raw keys.
    pub fn lookup(&self, name: &str) -> Option<&FieldSpec> {
        self.field_by_attr(name).or_else(|| self.field(name))
    }

    pub fn is_required(&self, name: &str) -> Result<bool> {
        self.lookup(name)
            .map(|f| f.required)
            .ok_or_else(|| Error::UnknownField { type_name: self.name.clone(), field: name.to_string() })
    }

    pub fn is_optional(&self, name: &str) -> Result<bool> {
        self.is_required(name).map(|r| !r)
    }

    /// Required wire names absent from `given`, in declaration order.
    pub fn missing_required<F>(&self, mut given: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        self.required_fields()
            .filter(|f| !given(&f.wire_name))
            .map(|f| f.wire_name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Declares an [`ObjectType`] field by field.
#[derive(Debug, Clone)]
pub struct ObjectBuilder {
    name: String,
    fields: Vec<(String, Option<Ty>, bool)>,
}

impl ObjectBuilder {
    /// A field with no default.
    pub fn required(mut self, wire_name: impl Into<String>, ty: Ty) -> Self {
        self.fields.push((wire_name.into(), Some(ty), true));
        self
    }

    /// A field with a default; absent and null both read back as null.
    pub fn optional(mut self, wire_name: impl Into<String>, ty: Ty) -> Self {
        self.fields.push((wire_name.into(), Some(ty), false));
        self
    }

    /// A field without a type annotation; coerced as `Any`.
    pub fn untyped(mut self, wire_name: impl Into<String>, required: bool) -> Self {
        self.fields.push((wire_name.into(), None, required));
        self
    }

    pub fn build(self) -> Result<ObjectType> {
        let mut fields = IndexMap::with_capacity(self.fields.len());
        let mut by_attr = IndexMap::with_capacity(self.fields.len());
        for (wire_name, ty, required) in self.fields {
            let attr_name = shadow(&wire_name);
            // `type` and `type_` would share one attribute name
            if fields.contains_key(&wire_name) || by_attr.contains_key(&attr_name) {
                return Err(Error::DuplicateField { type_name: self.name, field: wire_name });
            }
            by_attr.insert(attr_name.clone(), fields.len());
            fields.insert(wire_name.clone(), FieldSpec {
                wire_name,
                attr_name,
                ty: ty.unwrap_or(Ty::Any),
                required,
            });
        }
        Ok(ObjectType { name: self.name, fields, by_attr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> ObjectType {
        ObjectType::builder("Message")
            .required("message_id", Ty::int())
            .optional("from", Ty::object("User"))
            .required("date", Ty::int())
            .optional("type", Ty::str())
            .untyped("extra", false)
            .build()
            .unwrap()
    }

    #[test]
    fn required_and_optional_keep_declaration_order() {
        let m = message();
        let req: Vec<_> = m.required_fields().map(|f| f.wire_name.as_str()).collect();
        let opt: Vec<_> = m.optional_fields().map(|f| f.wire_name.as_str()).collect();
        assert_eq!(req, ["message_id", "date"]);
        assert_eq!(opt, ["from", "type", "extra"]);
        let all: Vec<_> = m.fields().map(|f| f.wire_name.as_str()).collect();
        assert_eq!(all, ["message_id", "from", "date", "type", "extra"]);
    }

    #[test]
    fn reserved_wire_names_get_shadowed_attributes() {
        let m = message();
        let f = m.field("type").unwrap();
        assert_eq!(f.attr_name, "type_");
        assert_eq!(m.field_by_attr("type_").unwrap().wire_name, "type");
        // "from" is not a Rust keyword
        assert_eq!(m.field("from").unwrap().attr_name, "from");
    }

    #[test]
    fn untyped_fields_default_to_any() {
        assert_eq!(message().field("extra").unwrap().ty, Ty::Any);
    }

    #[test]
    fn requiredness_lookups() {
        let m = message();
        assert!(m.is_required("date").unwrap());
        assert!(m.is_optional("type_").unwrap());
        assert!(matches!(m.is_required("nope"), Err(Error::UnknownField { .. })));
        assert_eq!(m.missing_required(|k| k == "date"), ["message_id"]);
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let err = ObjectType::builder("X").required("a", Ty::int()).optional("a", Ty::str()).build();
        assert!(matches!(err, Err(Error::DuplicateField { .. })));

        let err = ObjectType::builder("X").optional("type", Ty::str()).optional("type_", Ty::str()).build();
        assert_eq!(err.unwrap_err(), Error::DuplicateField { type_name: "X".into(), field: "type_".into() });
    }
}
