use thiserror::Error;

use crate::models::{
    write::{NewCliente, NewEntrada, NewProducto, NewProveedor, NewSalida, ValidationError},
    Cliente, EntityKind, Entrada, Id, Producto, Proveedor, Salida,
};
use crate::report::DateRange;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Id },
    #[error("{entity} {id} referenced by the new row does not exist")]
    MissingReference { entity: EntityKind, id: Id },
    #[error("{entity} {id} is still referenced by {by} rows")]
    Referenced { entity: EntityKind, id: Id, by: EntityKind },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    pub fn not_found(entity: EntityKind, id: Id) -> Self {
        StorageError::NotFound { entity, id }
    }
}

/// Offset/limit window over an id-ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(skip: u64, limit: u64) -> Self {
        Self { skip, limit }
    }

    pub fn clamped(self, max_limit: u64) -> Self {
        Self {
            skip: self.skip,
            limit: self.limit.min(max_limit),
        }
    }

    /// SQL engines take signed 64-bit LIMIT/OFFSET values.
    pub fn sql_limit(&self) -> i64 {
        i64::try_from(self.limit).unwrap_or(i64::MAX)
    }

    pub fn sql_offset(&self) -> i64 {
        i64::try_from(self.skip).unwrap_or(i64::MAX)
    }

    pub fn range(&self) -> (usize, usize) {
        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        (skip, limit)
    }
}

/// One relational store holding the five inventory tables.
///
/// Every method is its own unit of work: the backend acquires its connection
/// (or table lock) for the call, commits on success and discards on error.
/// Inputs are assumed validated; see [`crate::Inventory`].
pub trait StorageBackend: Send + Sync {
    /// Creates every table and index that does not exist yet.
    fn materialize_schema(&self) -> Result<(), StorageError>;

    fn create_producto(&self, input: &NewProducto) -> Result<Producto, StorageError>;
    fn get_producto(&self, id: Id) -> Result<Producto, StorageError>;
    fn list_productos(&self, page: Page) -> Result<Vec<Producto>, StorageError>;
    fn update_producto(&self, id: Id, input: &NewProducto) -> Result<Producto, StorageError>;
    /// Fails with `Referenced` while any entrada or salida points at the product.
    fn delete_producto(&self, id: Id) -> Result<(), StorageError>;

    fn create_cliente(&self, input: &NewCliente) -> Result<Cliente, StorageError>;
    fn get_cliente(&self, id: Id) -> Result<Cliente, StorageError>;
    fn list_clientes(&self, page: Page) -> Result<Vec<Cliente>, StorageError>;
    fn update_cliente(&self, id: Id, input: &NewCliente) -> Result<Cliente, StorageError>;
    /// Fails with `Referenced` while any salida points at the client.
    fn delete_cliente(&self, id: Id) -> Result<(), StorageError>;

    /// Fails with `MissingReference` when the product does not exist.
    fn create_entrada(&self, input: &NewEntrada) -> Result<Entrada, StorageError>;
    fn get_entrada(&self, id: Id) -> Result<Entrada, StorageError>;
    fn list_entradas(&self, page: Page) -> Result<Vec<Entrada>, StorageError>;

    /// Fails with `MissingReference` when the product or the client does not exist.
    fn create_salida(&self, input: &NewSalida) -> Result<Salida, StorageError>;
    fn get_salida(&self, id: Id) -> Result<Salida, StorageError>;
    fn list_salidas(&self, page: Page) -> Result<Vec<Salida>, StorageError>;

    fn create_proveedor(&self, input: &NewProveedor) -> Result<Proveedor, StorageError>;
    fn get_proveedor(&self, id: Id) -> Result<Proveedor, StorageError>;
    fn list_proveedores(&self, page: Page) -> Result<Vec<Proveedor>, StorageError>;

    /// Entradas whose fecha lies inside the inclusive range, ordered by fecha then id.
    fn entradas_between(&self, range: &DateRange) -> Result<Vec<Entrada>, StorageError>;
    /// Salidas whose fecha lies inside the inclusive range, ordered by fecha then id.
    fn salidas_between(&self, range: &DateRange) -> Result<Vec<Salida>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamp() {
        let page = Page::new(10, 10_000).clamped(500);
        assert_eq!(page, Page::new(10, 500));
        assert_eq!(Page::new(0, 20).clamped(500).limit, 20);
    }

    #[test]
    fn test_page_sql_bounds_saturate() {
        let page = Page::new(u64::MAX, u64::MAX);
        assert_eq!(page.sql_limit(), i64::MAX);
        assert_eq!(page.sql_offset(), i64::MAX);
    }
}
