//! Runtime parameter registry: schema-validated, path-keyed, observable.

pub mod persist;
pub mod store;

pub use persist::{FileParamStore, MemoryParamStore, ParamStore};
pub use store::{ParamError, ParamRegistry};
