//! Model persistence
//!
//! - Checksummed model envelopes in binary (bincode) or JSON form
//! - [`ModelStore`] contract with in-memory and directory-backed stores
//! - Single-file [`save_model`] / [`load_model`] helpers

mod serializer;
mod store;

pub use serializer::{load_model, save_model, ModelMetadata, SerializationFormat, SerializedModel};
pub use store::{FileModelStore, MemoryModelStore, ModelStore};
