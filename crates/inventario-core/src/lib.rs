//! Core types and traits for inventario storage backends.
//!
//! This crate provides the entity model, the `StorageBackend` trait every
//! backend implements, and the `Inventory` data-access layer that validates
//! input and shapes report queries on top of a backend.

pub mod inventory;
pub mod models;
pub mod report;
pub mod storage;

// Re-export key types at crate root for convenience
pub use inventory::Inventory;
pub use models::{Cliente, EntityKind, Entrada, Id, Producto, Proveedor, Salida};
pub use models::write::{NewCliente, NewEntrada, NewProducto, NewProveedor, NewSalida, ValidationError};
pub use report::{DateRange, ReportError, ReportKind};
pub use storage::{Page, StorageBackend, StorageError};
