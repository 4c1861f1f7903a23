use std::sync::Arc;

use crate::models::{
    write::{NewCliente, NewEntrada, NewProducto, NewProveedor, NewSalida},
    Cliente, Entrada, Id, Producto, Proveedor, Salida,
};
use crate::report::{DateRange, ReportError, ReportKind};
use crate::storage::{Page, StorageBackend, StorageError};

/// Data-access layer shared by every request handler.
///
/// Wraps one storage backend, validates inputs before they reach it, bounds
/// list sizes and turns report failures into [`ReportError`].
pub struct Inventory {
    storage: Arc<dyn StorageBackend>,
    max_page_size: u64,
}

impl Inventory {
    pub fn new(storage: Arc<dyn StorageBackend>, max_page_size: u64) -> Self {
        Self {
            storage,
            max_page_size,
        }
    }

    fn page(&self, page: Page) -> Page {
        page.clamped(self.max_page_size)
    }

    pub fn create_producto(&self, input: &NewProducto) -> Result<Producto, StorageError> {
        input.validate()?;
        self.storage.create_producto(input)
    }

    pub fn get_producto(&self, id: Id) -> Result<Producto, StorageError> {
        self.storage.get_producto(id)
    }

    pub fn list_productos(&self, page: Page) -> Result<Vec<Producto>, StorageError> {
        self.storage.list_productos(self.page(page))
    }

    pub fn update_producto(&self, id: Id, input: &NewProducto) -> Result<Producto, StorageError> {
        input.validate()?;
        self.storage.update_producto(id, input)
    }

    pub fn delete_producto(&self, id: Id) -> Result<(), StorageError> {
        self.storage.delete_producto(id)
    }

    pub fn create_cliente(&self, input: &NewCliente) -> Result<Cliente, StorageError> {
        input.validate()?;
        self.storage.create_cliente(input)
    }

    pub fn get_cliente(&self, id: Id) -> Result<Cliente, StorageError> {
        self.storage.get_cliente(id)
    }

    pub fn list_clientes(&self, page: Page) -> Result<Vec<Cliente>, StorageError> {
        self.storage.list_clientes(self.page(page))
    }

    pub fn update_cliente(&self, id: Id, input: &NewCliente) -> Result<Cliente, StorageError> {
        input.validate()?;
        self.storage.update_cliente(id, input)
    }

    pub fn delete_cliente(&self, id: Id) -> Result<(), StorageError> {
        self.storage.delete_cliente(id)
    }

    pub fn create_entrada(&self, input: &NewEntrada) -> Result<Entrada, StorageError> {
        input.validate()?;
        self.storage.create_entrada(input)
    }

    pub fn get_entrada(&self, id: Id) -> Result<Entrada, StorageError> {
        self.storage.get_entrada(id)
    }

    pub fn list_entradas(&self, page: Page) -> Result<Vec<Entrada>, StorageError> {
        self.storage.list_entradas(self.page(page))
    }

    pub fn create_salida(&self, input: &NewSalida) -> Result<Salida, StorageError> {
        input.validate()?;
        self.storage.create_salida(input)
    }

    pub fn get_salida(&self, id: Id) -> Result<Salida, StorageError> {
        self.storage.get_salida(id)
    }

    pub fn list_salidas(&self, page: Page) -> Result<Vec<Salida>, StorageError> {
        self.storage.list_salidas(self.page(page))
    }

    pub fn create_proveedor(&self, input: &NewProveedor) -> Result<Proveedor, StorageError> {
        input.validate()?;
        self.storage.create_proveedor(input)
    }

    pub fn get_proveedor(&self, id: Id) -> Result<Proveedor, StorageError> {
        self.storage.get_proveedor(id)
    }

    pub fn list_proveedores(&self, page: Page) -> Result<Vec<Proveedor>, StorageError> {
        self.storage.list_proveedores(self.page(page))
    }

    pub fn entradas_between(&self, start: &str, end: &str) -> Result<Vec<Entrada>, ReportError> {
        let range = DateRange::parse(start, end)?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        self.storage.entradas_between(&range).map_err(|e| {
            tracing::error!(report = %ReportKind::Entradas, error = %e, "Report query failed");
            ReportError::Unavailable(ReportKind::Entradas)
        })
    }

    pub fn salidas_between(&self, start: &str, end: &str) -> Result<Vec<Salida>, ReportError> {
        let range = DateRange::parse(start, end)?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        self.storage.salidas_between(&range).map_err(|e| {
            tracing::error!(report = %ReportKind::Salidas, error = %e, "Report query failed");
            ReportError::Unavailable(ReportKind::Salidas)
        })
    }
}
