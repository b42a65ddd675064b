//! Schema-driven mapping between a JSON wire protocol and typed instances.
//!
//! Declare object types (in code with [`ObjectType::builder`] or from a JSON
//! file with [`schema::load_path`]), freeze them into a [`Registry`], then
//! decode raw wire objects into [`TypedInstance`]s and encode them back.
//!
//! ```
//! use json_wire::{ObjectType, Registry, Ty};
//!
//! let mut builder = Registry::builder();
//! builder.register(ObjectType::builder("Point")
//!     .required("x", Ty::int())
//!     .required("y", Ty::int())
//!     .optional("label", Ty::str())
//!     .build()?)?;
//! let registry = builder.build();
//!
//! let p = registry.decode_str("Point", r#"{"x": 1, "y": 2, "z": 9}"#)?;
//! assert!(p.get("label")?.is_null());
//! assert_eq!(p.get("z")?.as_i64(), Some(9));
//! # Ok::<(), json_wire::Error>(())
//! ```

pub mod decode;
pub mod error;
pub mod fields;
pub mod ir;
pub mod path_de;
pub mod registry;
pub mod schema;
pub mod shadow;
pub mod store;
pub mod value;

pub use decode::{encode, Decoded, Limits, RawMap};
pub use error::{Diagnostic, DiagnosticKind, Error, Result};
pub use fields::{FieldSpec, ObjectBuilder, ObjectType};
pub use ir::{Scalar, Ty};
pub use registry::{DanglingRef, Registry, RegistryBuilder};
pub use shadow::{shadow, unshadow};
pub use store::{InstanceBuilder, TypedInstance};
pub use value::Value;
