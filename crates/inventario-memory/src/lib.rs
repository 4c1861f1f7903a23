//! In-memory storage backend for inventario.
//!
//! All five tables live behind one `RwLock`; holding the guard for the
//! duration of a call is the unit of work. Writes check every precondition
//! before touching a table, so a failed call leaves no partial state.

use std::{
    collections::BTreeMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use inventario_core::{
    Cliente, DateRange, EntityKind, Entrada, Id, NewCliente, NewEntrada, NewProducto,
    NewProveedor, NewSalida, Page, Producto, Proveedor, Salida, StorageBackend, StorageError,
};

struct Table<T> {
    rows: BTreeMap<Id, T>,
    last_id: Id,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }

    /// Ids are never reused, even after the highest row is deleted.
    fn next_id(&mut self) -> Id {
        self.last_id += 1;
        self.last_id
    }

    fn get(&self, kind: EntityKind, id: Id) -> Result<T, StorageError> {
        self.rows
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(kind, id))
    }

    fn page(&self, page: Page) -> Vec<T> {
        let (skip, limit) = page.range();
        self.rows.values().skip(skip).take(limit).cloned().collect()
    }
}

struct Tables {
    productos: Table<Producto>,
    clientes: Table<Cliente>,
    entradas: Table<Entrada>,
    salidas: Table<Salida>,
    proveedores: Table<Proveedor>,
}

impl Tables {
    fn new() -> Self {
        Self {
            productos: Table::new(),
            clientes: Table::new(),
            entradas: Table::new(),
            salidas: Table::new(),
            proveedores: Table::new(),
        }
    }
}

pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables
            .read()
            .map_err(|_| StorageError::Unavailable("in-memory tables poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables
            .write()
            .map_err(|_| StorageError::Unavailable("in-memory tables poisoned".to_string()))
    }
}

impl StorageBackend for InMemoryStorage {
    fn materialize_schema(&self) -> Result<(), StorageError> {
        // Tables exist from construction.
        Ok(())
    }

    fn create_producto(&self, input: &NewProducto) -> Result<Producto, StorageError> {
        let mut tables = self.write()?;
        let id = tables.productos.next_id();
        let producto = input.clone().into_record(id);
        tables.productos.rows.insert(id, producto.clone());
        tracing::debug!(id, "Producto created");
        Ok(producto)
    }

    fn get_producto(&self, id: Id) -> Result<Producto, StorageError> {
        self.read()?.productos.get(EntityKind::Producto, id)
    }

    fn list_productos(&self, page: Page) -> Result<Vec<Producto>, StorageError> {
        Ok(self.read()?.productos.page(page))
    }

    fn update_producto(&self, id: Id, input: &NewProducto) -> Result<Producto, StorageError> {
        let mut tables = self.write()?;
        let row = tables
            .productos
            .rows
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found(EntityKind::Producto, id))?;
        *row = input.clone().into_record(id);
        Ok(row.clone())
    }

    fn delete_producto(&self, id: Id) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if !tables.productos.rows.contains_key(&id) {
            return Err(StorageError::not_found(EntityKind::Producto, id));
        }
        if tables.entradas.rows.values().any(|e| e.producto_id == id) {
            return Err(StorageError::Referenced {
                entity: EntityKind::Producto,
                id,
                by: EntityKind::Entrada,
            });
        }
        if tables.salidas.rows.values().any(|s| s.producto_id == id) {
            return Err(StorageError::Referenced {
                entity: EntityKind::Producto,
                id,
                by: EntityKind::Salida,
            });
        }
        tables.productos.rows.remove(&id);
        tracing::debug!(id, "Producto deleted");
        Ok(())
    }

    fn create_cliente(&self, input: &NewCliente) -> Result<Cliente, StorageError> {
        let mut tables = self.write()?;
        let id = tables.clientes.next_id();
        let cliente = input.clone().into_record(id);
        tables.clientes.rows.insert(id, cliente.clone());
        tracing::debug!(id, "Cliente created");
        Ok(cliente)
    }

    fn get_cliente(&self, id: Id) -> Result<Cliente, StorageError> {
        self.read()?.clientes.get(EntityKind::Cliente, id)
    }

    fn list_clientes(&self, page: Page) -> Result<Vec<Cliente>, StorageError> {
        Ok(self.read()?.clientes.page(page))
    }

    fn update_cliente(&self, id: Id, input: &NewCliente) -> Result<Cliente, StorageError> {
        let mut tables = self.write()?;
        let row = tables
            .clientes
            .rows
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found(EntityKind::Cliente, id))?;
        *row = input.clone().into_record(id);
        Ok(row.clone())
    }

    fn delete_cliente(&self, id: Id) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if !tables.clientes.rows.contains_key(&id) {
            return Err(StorageError::not_found(EntityKind::Cliente, id));
        }
        if tables.salidas.rows.values().any(|s| s.cliente_id == id) {
            return Err(StorageError::Referenced {
                entity: EntityKind::Cliente,
                id,
                by: EntityKind::Salida,
            });
        }
        tables.clientes.rows.remove(&id);
        tracing::debug!(id, "Cliente deleted");
        Ok(())
    }

    fn create_entrada(&self, input: &NewEntrada) -> Result<Entrada, StorageError> {
        let mut tables = self.write()?;
        if !tables.productos.rows.contains_key(&input.producto_id) {
            return Err(StorageError::MissingReference {
                entity: EntityKind::Producto,
                id: input.producto_id,
            });
        }
        let id = tables.entradas.next_id();
        let entrada = input.clone().into_record(id);
        tables.entradas.rows.insert(id, entrada.clone());
        Ok(entrada)
    }

    fn get_entrada(&self, id: Id) -> Result<Entrada, StorageError> {
        self.read()?.entradas.get(EntityKind::Entrada, id)
    }

    fn list_entradas(&self, page: Page) -> Result<Vec<Entrada>, StorageError> {
        Ok(self.read()?.entradas.page(page))
    }

    fn create_salida(&self, input: &NewSalida) -> Result<Salida, StorageError> {
        let mut tables = self.write()?;
        if !tables.productos.rows.contains_key(&input.producto_id) {
            return Err(StorageError::MissingReference {
                entity: EntityKind::Producto,
                id: input.producto_id,
            });
        }
        if !tables.clientes.rows.contains_key(&input.cliente_id) {
            return Err(StorageError::MissingReference {
                entity: EntityKind::Cliente,
                id: input.cliente_id,
            });
        }
        let id = tables.salidas.next_id();
        let salida = input.clone().into_record(id);
        tables.salidas.rows.insert(id, salida.clone());
        Ok(salida)
    }

    fn get_salida(&self, id: Id) -> Result<Salida, StorageError> {
        self.read()?.salidas.get(EntityKind::Salida, id)
    }

    fn list_salidas(&self, page: Page) -> Result<Vec<Salida>, StorageError> {
        Ok(self.read()?.salidas.page(page))
    }

    fn create_proveedor(&self, input: &NewProveedor) -> Result<Proveedor, StorageError> {
        let mut tables = self.write()?;
        let id = tables.proveedores.next_id();
        let proveedor = input.clone().into_record(id);
        tables.proveedores.rows.insert(id, proveedor.clone());
        Ok(proveedor)
    }

    fn get_proveedor(&self, id: Id) -> Result<Proveedor, StorageError> {
        self.read()?.proveedores.get(EntityKind::Proveedor, id)
    }

    fn list_proveedores(&self, page: Page) -> Result<Vec<Proveedor>, StorageError> {
        Ok(self.read()?.proveedores.page(page))
    }

    fn entradas_between(&self, range: &DateRange) -> Result<Vec<Entrada>, StorageError> {
        let tables = self.read()?;
        let mut rows: Vec<Entrada> = tables
            .entradas
            .rows
            .values()
            .filter(|e| e.fecha.map_or(false, |f| range.contains(f)))
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.fecha, e.id));
        Ok(rows)
    }

    fn salidas_between(&self, range: &DateRange) -> Result<Vec<Salida>, StorageError> {
        let tables = self.read()?;
        let mut rows: Vec<Salida> = tables
            .salidas
            .rows
            .values()
            .filter(|s| s.fecha.map_or(false, |f| range.contains(f)))
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.fecha, s.id));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use inventario_core::{Inventory, ReportError};
    use rust_decimal_macros::dec;
    use time::{Date, Month};

    fn widget() -> NewProducto {
        NewProducto {
            nombre: Some("Widget".to_string()),
            descripcion: None,
            precio: Some(dec!(9.99)),
            stock: Some(10),
        }
    }

    fn cliente(nombre: &str) -> NewCliente {
        NewCliente {
            nombre: nombre.to_string(),
            direccion: None,
            telefono: Some("555-0100".to_string()),
            email: None,
        }
    }

    fn fecha(day: u8) -> Option<Date> {
        Some(Date::from_calendar_date(2024, Month::January, day).unwrap())
    }

    #[test]
    fn test_create_then_get() {
        let storage = InMemoryStorage::new();
        let created = storage.create_producto(&widget()).unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(storage.get_producto(created.id).unwrap(), created);
        assert_eq!(created.stock, Some(10));
    }

    #[test]
    fn test_update_overwrites_full_field_set() {
        let storage = InMemoryStorage::new();
        let created = storage.create_producto(&widget()).unwrap();
        let updated = storage
            .update_producto(created.id, &NewProducto { stock: Some(5), ..Default::default() })
            .unwrap();
        assert_eq!(updated.stock, Some(5));
        assert_eq!(updated.nombre, None);
        assert!(matches!(
            storage.update_producto(99, &widget()),
            Err(StorageError::NotFound { entity: EntityKind::Producto, id: 99 })
        ));
    }

    #[test]
    fn test_deleted_ids_are_not_reused() {
        let storage = InMemoryStorage::new();
        let first = storage.create_producto(&widget()).unwrap();
        storage.delete_producto(first.id).unwrap();
        assert!(matches!(
            storage.get_producto(first.id),
            Err(StorageError::NotFound { .. })
        ));
        let second = storage.create_producto(&widget()).unwrap();
        assert_eq!(second.id, first.id + 1);
    }

    #[test]
    fn test_pagination_partitions() {
        let storage = InMemoryStorage::new();
        for _ in 0..5 {
            storage.create_cliente(&cliente("Ana")).unwrap();
        }
        let first = storage.list_clientes(Page::new(0, 2)).unwrap();
        let second = storage.list_clientes(Page::new(2, 2)).unwrap();
        let third = storage.list_clientes(Page::new(4, 2)).unwrap();
        let ids: Vec<Id> = first.iter().chain(&second).chain(&third).map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(storage.list_clientes(Page::new(0, 2)).unwrap(), first);
    }

    #[test]
    fn test_foreign_keys_are_checked() {
        let storage = InMemoryStorage::new();
        let err = storage
            .create_entrada(&NewEntrada { producto_id: 7, cantidad: Some(1), fecha: None })
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::MissingReference { entity: EntityKind::Producto, id: 7 }
        ));

        let p = storage.create_producto(&widget()).unwrap();
        let err = storage
            .create_salida(&NewSalida { producto_id: p.id, cliente_id: 3, cantidad: None, fecha: None })
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::MissingReference { entity: EntityKind::Cliente, id: 3 }
        ));
        assert!(storage.list_salidas(Page::new(0, 10)).unwrap().is_empty());
    }

    #[test]
    fn test_delete_restricted_while_referenced() {
        let storage = InMemoryStorage::new();
        let p = storage.create_producto(&widget()).unwrap();
        let c = storage.create_cliente(&cliente("Luis")).unwrap();
        storage
            .create_salida(&NewSalida { producto_id: p.id, cliente_id: c.id, cantidad: Some(2), fecha: fecha(3) })
            .unwrap();

        assert!(matches!(
            storage.delete_producto(p.id),
            Err(StorageError::Referenced { by: EntityKind::Salida, .. })
        ));
        assert!(matches!(
            storage.delete_cliente(c.id),
            Err(StorageError::Referenced { by: EntityKind::Salida, .. })
        ));
        assert!(storage.get_producto(p.id).is_ok());
        assert!(storage.get_cliente(c.id).is_ok());
    }

    #[test]
    fn test_report_window_is_inclusive() {
        let storage = Arc::new(InMemoryStorage::new());
        let p = storage.create_producto(&widget()).unwrap();
        for fecha in [fecha(1), fecha(31), None, Some(Date::from_calendar_date(2024, Month::February, 1).unwrap())] {
            storage
                .create_entrada(&NewEntrada { producto_id: p.id, cantidad: Some(1), fecha })
                .unwrap();
        }

        let inventory = Inventory::new(storage, 100);
        let rows = inventory.entradas_between("2024-01-01", "2024-01-31").unwrap();
        let ids: Vec<Id> = rows.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);

        assert!(matches!(
            inventory.entradas_between("2024-01-01", "enero"),
            Err(ReportError::InvalidDate { .. })
        ));
        assert!(inventory.entradas_between("2024-02-01", "2024-01-01").unwrap().is_empty());
    }

    #[test]
    fn test_inventory_validates_and_clamps() {
        let storage = Arc::new(InMemoryStorage::new());
        let inventory = Inventory::new(storage, 3);
        let err = inventory
            .create_producto(&NewProducto { stock: Some(-4), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));
        assert!(inventory.list_productos(Page::new(0, 10)).unwrap().is_empty());

        for _ in 0..5 {
            inventory.create_producto(&widget()).unwrap();
        }
        assert_eq!(inventory.list_productos(Page::new(0, 1_000)).unwrap().len(), 3);
    }
}
