//! Object type registry.
//!
//! Loading is two-pass: every shape is registered on a [`RegistryBuilder`]
//! first, then [`RegistryBuilder::build`] freezes them into an immutable
//! [`Registry`]. Object references inside descriptors are plain names and are
//! looked up on first coercion, so declaration order never matters and
//! self-referential types work. A frozen registry is `Send + Sync` and cheap
//! to clone.

use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;

use crate::decode::Limits;
use crate::error::{Error, Result};
use crate::fields::ObjectType;
use crate::store::InstanceBuilder;

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    types: IndexMap<String, ObjectType>,
    limits: Limits,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: ObjectType) -> Result<&mut Self> {
        if self.types.contains_key(ty.name()) {
            return Err(Error::DuplicateType(ty.name().to_string()));
        }
        self.types.insert(ty.name().to_string(), ty);
        Ok(self)
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn set_limits(&mut self, limits: Limits) -> &mut Self {
        self.limits = limits;
        self
    }

    pub fn build(self) -> Registry {
        let types = self
            .types
            .into_iter()
            .map(|(name, ty)| (name, Arc::new(ty)))
            .collect();
        Registry { inner: Arc::new(Inner { types, limits: self.limits }) }
    }
}

#[derive(Debug)]
struct Inner {
    types: IndexMap<String, Arc<ObjectType>>,
    limits: Limits,
}

#[derive(Debug, Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

/// A field whose descriptor names an object type that was never registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRef {
    pub type_name: String,
    pub field: String,
    pub target: String,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ObjectType>> {
        let found = self.inner.types.get(name);
        if found.is_none() {
            tracing::debug!(name, "object type lookup missed");
        }
        found
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<ObjectType>> {
        self.get(name).cloned().ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.types.contains_key(name)
    }

    /// Registered type names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.types.keys().map(String::as_str)
    }

    pub fn limits(&self) -> Limits {
        self.inner.limits
    }

    /// Starts direct construction of an outgoing instance.
    pub fn instance(&self, type_name: &str) -> Result<InstanceBuilder> {
        Ok(InstanceBuilder::new(self.clone(), self.resolve(type_name)?))
    }

    /// References that will degrade to pass-through diagnostics at decode time.
    pub fn dangling_refs(&self) -> Vec<DanglingRef> {
        let mut out = Vec::new();
        for ty in self.inner.types.values() {
            for field in ty.fields() {
                for target in field.ty.object_refs() {
                    if !self.contains(target) {
                        out.push(DanglingRef {
                            type_name: ty.name().to_string(),
                            field: field.wire_name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }
        out
    }

    pub(crate) fn same_as(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// GLOBAL SLOT
// ————————————————————————————————————————————————————————————————————————————

static GLOBAL: OnceCell<Registry> = OnceCell::new();

/// Installs the process-wide registry. Only the first call wins; later
/// calls hand their registry back.
pub fn install_global(registry: Registry) -> Result<&'static Registry, Registry> {
    GLOBAL.try_insert(registry).map_err(|(_, rejected)| rejected)
}

pub fn global() -> Option<&'static Registry> {
    GLOBAL.get()
}
