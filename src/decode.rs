//! Type-directed coercion of raw wire values.
//!
//! The [`Decoder`] walks a value and its declared [`Ty`] together:
//! - scalars and `Any` pass through when assignable, otherwise fail;
//! - object references build a [`TypedInstance`] through [`Decoder::decode_map`];
//! - sequences and mappings coerce their elements and rebuild the container;
//! - unions try their members in declared order, each trial on a scratch copy.
//!
//! Unresolved references and unmatched unions never abort a decode: they
//! leave the value unconverted and record a [`Diagnostic`].

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{Diagnostic, DiagnosticKind, Error, Result};
use crate::fields::{FieldSpec, ObjectType};
use crate::ir::{Scalar, Ty};
use crate::registry::Registry;
use crate::store::TypedInstance;
use crate::value::Value;

/// Bounds on a single decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// Maximum nesting of objects, sequences and mappings.
    pub max_depth: usize,
    /// Maximum number of values visited, union trials included.
    pub max_nodes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_depth: 64, max_nodes: 1_000_000 }
    }
}

/// A decoded instance together with the diagnostics raised on the way.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub instance: TypedInstance,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
enum Seg {
    Key(String),
    Index(usize),
}

pub(crate) struct Decoder<'r> {
    registry: &'r Registry,
    limits: Limits,
    nodes: usize,
    path: Vec<Seg>,
    diagnostics: Vec<Diagnostic>,
}

impl<'r> Decoder<'r> {
    pub(crate) fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            limits: registry.limits(),
            nodes: 0,
            path: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    // ——— entry point ———————————————————————————————————————————————————————

    /// Checks required-field presence, coerces every key and builds the instance.
    /// Undeclared keys are kept in the wire store as they arrived.
    pub(crate) fn decode_map(
        &mut self,
        ty: &Arc<ObjectType>,
        mut map: IndexMap<String, Value>,
    ) -> Result<TypedInstance> {
        let missing = ty.missing_required(|k| map.contains_key(k));
        if !missing.is_empty() {
            return Err(Error::MissingFields { type_name: ty.name().to_string(), missing });
        }

        let order: Vec<String> = map.keys().cloned().collect();
        let mut coerced = IndexMap::with_capacity(map.len());

        for field in ty.required_fields() {
            let Some(raw) = map.shift_remove(&field.wire_name) else { continue };
            let v = self.coerce_field(field, raw)?;
            coerced.insert(field.wire_name.clone(), v);
        }

        for (key, raw) in map {
            match ty.field(&key) {
                // explicit null on an optional field collapses to absent
                Some(_) if raw.is_null() => {}
                Some(field) => {
                    let v = self.coerce_field(field, raw)?;
                    coerced.insert(key, v);
                }
                None => {
                    self.at(Seg::Key(key.clone()), |d| {
                        d.diagnose(
                            DiagnosticKind::UnknownField,
                            format!("`{}` does not declare `{key}`; kept as received", ty.name()),
                        );
                        d.coerce(raw, &Ty::Any)
                    })
                    .map(|v| coerced.insert(key, v))?;
                }
            }
        }

        let wire = order
            .into_iter()
            .filter_map(|k| coerced.shift_remove(&k).map(|v| (k, v)))
            .collect();
        Ok(TypedInstance::from_parts(self.registry.clone(), Arc::clone(ty), wire))
    }

    pub(crate) fn coerce_field(&mut self, field: &FieldSpec, value: Value) -> Result<Value> {
        self.at(Seg::Key(field.wire_name.clone()), |d| d.coerce(value, &field.ty))
    }

    // ——— dispatch ——————————————————————————————————————————————————————————

    pub(crate) fn coerce(&mut self, value: Value, ty: &Ty) -> Result<Value> {
        self.nodes += 1;
        if self.nodes > self.limits.max_nodes {
            return Err(Error::NodeLimit { limit: self.limits.max_nodes });
        }
        match ty {
            Ty::Any => Ok(value),
            Ty::Scalar(s) if admits(*s, &value) => Ok(value),
            Ty::Scalar(_) => Err(self.mismatch(ty, &value)),
            Ty::Object(name) => self.coerce_object(value, name),
            Ty::Sequence(elem) => self.coerce_sequence(value, ty, elem),
            Ty::Mapping(key, val) => self.coerce_mapping(value, ty, key, val),
            Ty::Union(members) => self.coerce_union(value, ty, members),
        }
    }

    fn coerce_object(&mut self, value: Value, name: &str) -> Result<Value> {
        let registry = self.registry;
        let Some(object_ty) = registry.get(name) else {
            self.diagnose(
                DiagnosticKind::UnsupportedShape,
                format!("object type `{name}` is not registered; value left unconverted"),
            );
            return Ok(value);
        };
        match value {
            Value::Object(inst) if inst.type_name() == name => Ok(Value::Object(inst)),
            Value::Map(map) => self.decode_map(object_ty, map).map(Value::Object),
            other => Err(self.mismatch_name(name, &other)),
        }
    }

    fn coerce_sequence(&mut self, value: Value, ty: &Ty, elem: &Ty) -> Result<Value> {
        let items = match value {
            Value::Array(items) => items,
            other => return Err(self.mismatch(ty, &other)),
        };
        if let Some(name) = self.unresolved(elem) {
            self.diagnose(
                DiagnosticKind::UnsupportedShape,
                format!("element type `{name}` is not registered; sequence left unconverted"),
            );
            return Ok(Value::Array(items));
        }
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            out.push(self.at(Seg::Index(i), |d| d.coerce(item, elem))?);
        }
        Ok(Value::Array(out))
    }

    fn coerce_mapping(&mut self, value: Value, ty: &Ty, key: &Ty, val: &Ty) -> Result<Value> {
        let map = match value {
            Value::Map(map) => map,
            other => return Err(self.mismatch(ty, &other)),
        };
        if key.is_opaque() && val.is_opaque() {
            return Ok(Value::Map(map));
        }
        let side = match (self.unresolved(key), self.unresolved(val)) {
            (Some(k), Some(v)) => Some(format!("key type `{k}` and value type `{v}` are")),
            (Some(k), None) => Some(format!("key type `{k}` is")),
            (None, Some(v)) => Some(format!("value type `{v}` is")),
            (None, None) => None,
        };
        if let Some(side) = side {
            self.diagnose(
                DiagnosticKind::UnsupportedShape,
                format!("{side} not registered; mapping left unconverted"),
            );
            return Ok(Value::Map(map));
        }

        // JSON keys are always strings; scalar key types are taken as declared
        let mut out = IndexMap::with_capacity(map.len());
        for (k, v) in map {
            let (new_k, new_v) = self.at(Seg::Key(k.clone()), |d| {
                let new_k = if key.is_opaque() {
                    k
                } else {
                    match d.coerce(Value::String(k), key)? {
                        Value::String(s) => s,
                        other => other.to_json().to_string(),
                    }
                };
                let new_v = d.coerce(v, val)?;
                Ok((new_k, new_v))
            })?;
            out.insert(new_k, new_v);
        }
        Ok(Value::Map(out))
    }

    fn coerce_union(&mut self, value: Value, ty: &Ty, members: &[Ty]) -> Result<Value> {
        let members = Ty::flat_members(members);

        // 1) already the right shape
        let exact = members.iter().any(|m| match (*m, &value) {
            (Ty::Any, _) => true,
            (Ty::Scalar(s), v) => admits(*s, v),
            (Ty::Object(name), Value::Object(inst)) => inst.type_name() == name,
            _ => false,
        });
        if exact {
            return Ok(value);
        }

        // 2) object members, first success wins
        if matches!(value, Value::Map(_)) {
            for &member in &members {
                let Ty::Object(name) = member else { continue };
                if !self.registry.contains(name) {
                    self.diagnose(
                        DiagnosticKind::UnsupportedShape,
                        format!("union member `{name}` is not registered; skipped"),
                    );
                    continue;
                }
                if let Some(v) = self.trial(&value, member)? {
                    return Ok(v);
                }
            }
        }

        // 3) container members whose shape fits
        for &member in &members {
            let fits = matches!(
                (member, &value),
                (Ty::Sequence(_), Value::Array(_)) | (Ty::Mapping(..), Value::Map(_))
            );
            if fits {
                if let Some(v) = self.trial(&value, member)? {
                    return Ok(v);
                }
            }
        }

        // 4) lenient fallback
        self.diagnose(
            DiagnosticKind::UnionFallback,
            format!("`{}` matches no member of `{ty}`; value left unconverted", value.kind()),
        );
        Ok(value)
    }

    /// Coerces a scratch copy. On failure nothing from the attempt survives
    /// except one rejection diagnostic; limit breaches still abort.
    fn trial(&mut self, value: &Value, member: &Ty) -> Result<Option<Value>> {
        let depth = self.path.len();
        let mark = self.diagnostics.len();
        match self.coerce(value.clone(), member) {
            Ok(v) => Ok(Some(v)),
            Err(e @ (Error::NodeLimit { .. } | Error::DepthLimit { .. })) => Err(e),
            Err(e) => {
                self.path.truncate(depth);
                self.diagnostics.truncate(mark);
                self.diagnose(
                    DiagnosticKind::UnionCandidateRejected,
                    format!("union member `{member}` rejected: {e}"),
                );
                Ok(None)
            }
        }
    }

    // ——— helpers ———————————————————————————————————————————————————————————

    fn at<T>(&mut self, seg: Seg, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.path.len() >= self.limits.max_depth {
            return Err(Error::DepthLimit { limit: self.limits.max_depth, path: self.path_string() });
        }
        self.path.push(seg);
        let out = f(self);
        self.path.pop();
        out
    }

    fn unresolved<'t>(&self, ty: &'t Ty) -> Option<&'t str> {
        match ty {
            Ty::Object(name) if !self.registry.contains(name) => Some(name.as_str()),
            _ => None,
        }
    }

    fn diagnose(&mut self, kind: DiagnosticKind, message: String) {
        let path = self.path_string();
        match kind {
            DiagnosticKind::UnsupportedShape | DiagnosticKind::UnionFallback => {
                tracing::warn!(%path, "{message}");
            }
            DiagnosticKind::UnknownField | DiagnosticKind::UnionCandidateRejected => {
                tracing::debug!(%path, "{message}");
            }
        }
        self.diagnostics.push(Diagnostic { kind, path, message });
    }

    fn mismatch(&self, ty: &Ty, value: &Value) -> Error {
        self.mismatch_name(&ty.to_string(), value)
    }

    fn mismatch_name(&self, expected: &str, value: &Value) -> Error {
        Error::TypeMismatch {
            field: self.path_string(),
            expected: expected.to_string(),
            actual: value.kind(),
        }
    }

    fn path_string(&self) -> String {
        let mut out = String::from("$");
        for seg in &self.path {
            match seg {
                Seg::Key(k) => {
                    out.push('.');
                    out.push_str(k);
                }
                Seg::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

fn admits(scalar: Scalar, value: &Value) -> bool {
    match (scalar, value) {
        (Scalar::Null, Value::Null) | (Scalar::Bool, Value::Bool(_)) | (Scalar::Str, Value::String(_)) => true,
        (Scalar::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (Scalar::Float, Value::Number(_)) => true,
        _ => false,
    }
}

// ————————————————————————————————————————————————————————————————————————————
// FRONT API
// ————————————————————————————————————————————————————————————————————————————

pub type RawMap = serde_json::Map<String, serde_json::Value>;

impl Registry {
    /// Decodes a raw wire object into an instance of `type_name`.
    pub fn decode(&self, type_name: &str, raw: &RawMap) -> Result<TypedInstance> {
        self.decode_with_report(type_name, raw).map(|d| d.instance)
    }

    /// Like [`Registry::decode`], also returning the diagnostics.
    pub fn decode_with_report(&self, type_name: &str, raw: &RawMap) -> Result<Decoded> {
        let ty = self.resolve(type_name)?;
        let map = raw.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect();
        let mut decoder = Decoder::new(self);
        let instance = decoder.decode_map(&ty, map)?;
        Ok(Decoded { instance, diagnostics: decoder.into_diagnostics() })
    }

    pub fn decode_value(&self, type_name: &str, raw: &serde_json::Value) -> Result<TypedInstance> {
        match raw {
            serde_json::Value::Object(map) => self.decode(type_name, map),
            other => Err(Error::NotAnObject(Value::from(other).kind())),
        }
    }

    pub fn decode_str(&self, type_name: &str, src: &str) -> Result<TypedInstance> {
        let raw: serde_json::Value = serde_json::from_str(src).map_err(|e| Error::Json(e.to_string()))?;
        self.decode_value(type_name, &raw)
    }
}

/// Inverse of decode: the instance already is its wire-shaped store.
pub fn encode(instance: &TypedInstance) -> RawMap {
    instance.encode()
}
