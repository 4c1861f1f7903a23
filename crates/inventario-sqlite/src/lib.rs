use std::{
    str::FromStr,
    sync::{Mutex, MutexGuard},
};

use inventario_core::{
    models::{format_fecha, parse_fecha},
    Cliente, DateRange, EntityKind, Entrada, Id, NewCliente, NewEntrada, NewProducto,
    NewProveedor, NewSalida, Page, Producto, Proveedor, Salida, StorageBackend, StorageError,
};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Params, Row, Transaction};
use rust_decimal::Decimal;
use time::Date;

const PRODUCTO_COLUMNS: &str = "id, nombre, descripcion, precio, stock";
const CLIENTE_COLUMNS: &str = "id, nombre, direccion, telefono, email";
const ENTRADA_COLUMNS: &str = "id, producto_id, cantidad, fecha";
const SALIDA_COLUMNS: &str = "id, producto_id, cliente_id, cantidad, fecha";
const PROVEEDOR_COLUMNS: &str = "id, nombre, direccion, telefono, email";

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(sql_err)?;

        tracing::debug!(path, "SQLite database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection poisoned".to_string()))
    }

    /// Runs `f` inside one transaction. Any error drops the transaction,
    /// which rolls it back; the connection guard is released either way.
    fn with_session<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(sql_err)?;
        let out = f(&tx)?;
        tx.commit().map_err(sql_err)?;
        Ok(out)
    }
}

fn sql_err(e: rusqlite::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

fn decimal_to_str(d: &Option<Decimal>) -> Option<String> {
    d.as_ref().map(|d| d.to_string())
}

fn fecha_to_str(d: &Option<Date>) -> Option<String> {
    d.map(format_fecha)
}

fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Decimal::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn fecha_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Date>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        parse_fecha(&s).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("invalid fecha '{}'", s).into())
        })
    })
    .transpose()
}

fn producto_from_row(row: &Row) -> rusqlite::Result<Producto> {
    Ok(Producto {
        id: row.get(0)?,
        nombre: row.get(1)?,
        descripcion: row.get(2)?,
        precio: decimal_column(row, 3)?,
        stock: row.get(4)?,
    })
}

fn cliente_from_row(row: &Row) -> rusqlite::Result<Cliente> {
    Ok(Cliente {
        id: row.get(0)?,
        nombre: row.get(1)?,
        direccion: row.get(2)?,
        telefono: row.get(3)?,
        email: row.get(4)?,
    })
}

fn entrada_from_row(row: &Row) -> rusqlite::Result<Entrada> {
    Ok(Entrada {
        id: row.get(0)?,
        producto_id: row.get(1)?,
        cantidad: row.get(2)?,
        fecha: fecha_column(row, 3)?,
    })
}

fn salida_from_row(row: &Row) -> rusqlite::Result<Salida> {
    Ok(Salida {
        id: row.get(0)?,
        producto_id: row.get(1)?,
        cliente_id: row.get(2)?,
        cantidad: row.get(3)?,
        fecha: fecha_column(row, 4)?,
    })
}

fn proveedor_from_row(row: &Row) -> rusqlite::Result<Proveedor> {
    Ok(Proveedor {
        id: row.get(0)?,
        nombre: row.get(1)?,
        direccion: row.get(2)?,
        telefono: row.get(3)?,
        email: row.get(4)?,
    })
}

fn fetch_by_id<T>(
    conn: &Connection,
    kind: EntityKind,
    columns: &str,
    id: Id,
    map: fn(&Row) -> rusqlite::Result<T>,
) -> Result<T, StorageError> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?1", columns, kind.table());
    conn.query_row(&sql, params![id], map)
        .optional()
        .map_err(sql_err)?
        .ok_or_else(|| StorageError::not_found(kind, id))
}

fn fetch_page<T>(
    conn: &Connection,
    kind: EntityKind,
    columns: &str,
    page: Page,
    map: fn(&Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>, StorageError> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY id LIMIT ?1 OFFSET ?2",
        columns,
        kind.table()
    );
    fetch_all(conn, &sql, params![page.sql_limit(), page.sql_offset()], map)
}

fn fetch_all<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>, StorageError> {
    let mut stmt = conn.prepare(sql).map_err(sql_err)?;
    let rows = stmt
        .query_map(params, map)
        .map_err(sql_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sql_err)?;
    Ok(rows)
}

fn row_exists(conn: &Connection, table: &str, column: &str, id: Id) -> Result<bool, StorageError> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)", table, column);
    conn.query_row(&sql, params![id], |row| row.get(0))
        .map_err(sql_err)
}

fn require_reference(conn: &Connection, kind: EntityKind, id: Id) -> Result<(), StorageError> {
    if !row_exists(conn, kind.table(), "id", id)? {
        return Err(StorageError::MissingReference { entity: kind, id });
    }
    Ok(())
}

/// Load-then-delete with a RESTRICT check against each referencing table.
fn delete_restricted(
    conn: &Connection,
    kind: EntityKind,
    id: Id,
    referenced_by: &[(EntityKind, &str)],
) -> Result<(), StorageError> {
    if !row_exists(conn, kind.table(), "id", id)? {
        return Err(StorageError::not_found(kind, id));
    }
    for (by, column) in referenced_by {
        if row_exists(conn, by.table(), column, id)? {
            return Err(StorageError::Referenced { entity: kind, id, by: *by });
        }
    }
    let sql = format!("DELETE FROM {} WHERE id = ?1", kind.table());
    conn.execute(&sql, params![id]).map_err(sql_err)?;
    tracing::debug!(entity = %kind, id, "Row deleted");
    Ok(())
}

impl StorageBackend for SqliteStorage {
    fn materialize_schema(&self) -> Result<(), StorageError> {
        let conn = self.connection()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS productos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nombre VARCHAR(100),
                descripcion VARCHAR(250),
                precio TEXT,
                stock INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_productos_nombre
                ON productos(nombre);

            CREATE TABLE IF NOT EXISTS clientes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nombre TEXT NOT NULL,
                direccion TEXT,
                telefono TEXT,
                email TEXT
            );

            CREATE TABLE IF NOT EXISTS entradas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                producto_id INTEGER NOT NULL,
                cantidad INTEGER,
                fecha TEXT,
                FOREIGN KEY (producto_id) REFERENCES productos(id) ON DELETE RESTRICT
            );

            CREATE INDEX IF NOT EXISTS idx_entradas_fecha
                ON entradas(fecha);

            CREATE INDEX IF NOT EXISTS idx_entradas_producto
                ON entradas(producto_id);

            CREATE TABLE IF NOT EXISTS salidas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                producto_id INTEGER NOT NULL,
                cliente_id INTEGER NOT NULL,
                cantidad INTEGER,
                fecha TEXT,
                FOREIGN KEY (producto_id) REFERENCES productos(id) ON DELETE RESTRICT,
                FOREIGN KEY (cliente_id) REFERENCES clientes(id) ON DELETE RESTRICT
            );

            CREATE INDEX IF NOT EXISTS idx_salidas_fecha
                ON salidas(fecha);

            CREATE INDEX IF NOT EXISTS idx_salidas_producto
                ON salidas(producto_id);

            CREATE INDEX IF NOT EXISTS idx_salidas_cliente
                ON salidas(cliente_id);

            CREATE TABLE IF NOT EXISTS proveedores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nombre TEXT NOT NULL,
                direccion TEXT,
                telefono TEXT,
                email TEXT
            );
            ",
        )
        .map_err(sql_err)?;
        tracing::info!("SQLite schema ready");
        Ok(())
    }

    fn create_producto(&self, input: &NewProducto) -> Result<Producto, StorageError> {
        self.with_session(|tx| {
            tx.execute(
                "INSERT INTO productos (nombre, descripcion, precio, stock) VALUES (?1, ?2, ?3, ?4)",
                params![input.nombre, input.descripcion, decimal_to_str(&input.precio), input.stock],
            )
            .map_err(sql_err)?;
            let id = tx.last_insert_rowid();
            tracing::debug!(id, "Producto created");
            Ok(input.clone().into_record(id))
        })
    }

    fn get_producto(&self, id: Id) -> Result<Producto, StorageError> {
        self.with_session(|tx| fetch_by_id(tx, EntityKind::Producto, PRODUCTO_COLUMNS, id, producto_from_row))
    }

    fn list_productos(&self, page: Page) -> Result<Vec<Producto>, StorageError> {
        self.with_session(|tx| fetch_page(tx, EntityKind::Producto, PRODUCTO_COLUMNS, page, producto_from_row))
    }

    fn update_producto(&self, id: Id, input: &NewProducto) -> Result<Producto, StorageError> {
        self.with_session(|tx| {
            let changed = tx
                .execute(
                    "UPDATE productos SET nombre = ?1, descripcion = ?2, precio = ?3, stock = ?4 WHERE id = ?5",
                    params![input.nombre, input.descripcion, decimal_to_str(&input.precio), input.stock, id],
                )
                .map_err(sql_err)?;
            if changed == 0 {
                return Err(StorageError::not_found(EntityKind::Producto, id));
            }
            fetch_by_id(tx, EntityKind::Producto, PRODUCTO_COLUMNS, id, producto_from_row)
        })
    }

    fn delete_producto(&self, id: Id) -> Result<(), StorageError> {
        self.with_session(|tx| {
            delete_restricted(
                tx,
                EntityKind::Producto,
                id,
                &[(EntityKind::Entrada, "producto_id"), (EntityKind::Salida, "producto_id")],
            )
        })
    }

    fn create_cliente(&self, input: &NewCliente) -> Result<Cliente, StorageError> {
        self.with_session(|tx| {
            tx.execute(
                "INSERT INTO clientes (nombre, direccion, telefono, email) VALUES (?1, ?2, ?3, ?4)",
                params![input.nombre, input.direccion, input.telefono, input.email],
            )
            .map_err(sql_err)?;
            let id = tx.last_insert_rowid();
            tracing::debug!(id, "Cliente created");
            Ok(input.clone().into_record(id))
        })
    }

    fn get_cliente(&self, id: Id) -> Result<Cliente, StorageError> {
        self.with_session(|tx| fetch_by_id(tx, EntityKind::Cliente, CLIENTE_COLUMNS, id, cliente_from_row))
    }

    fn list_clientes(&self, page: Page) -> Result<Vec<Cliente>, StorageError> {
        self.with_session(|tx| fetch_page(tx, EntityKind::Cliente, CLIENTE_COLUMNS, page, cliente_from_row))
    }

    fn update_cliente(&self, id: Id, input: &NewCliente) -> Result<Cliente, StorageError> {
        self.with_session(|tx| {
            let changed = tx
                .execute(
                    "UPDATE clientes SET nombre = ?1, direccion = ?2, telefono = ?3, email = ?4 WHERE id = ?5",
                    params![input.nombre, input.direccion, input.telefono, input.email, id],
                )
                .map_err(sql_err)?;
            if changed == 0 {
                return Err(StorageError::not_found(EntityKind::Cliente, id));
            }
            fetch_by_id(tx, EntityKind::Cliente, CLIENTE_COLUMNS, id, cliente_from_row)
        })
    }

    fn delete_cliente(&self, id: Id) -> Result<(), StorageError> {
        self.with_session(|tx| {
            delete_restricted(tx, EntityKind::Cliente, id, &[(EntityKind::Salida, "cliente_id")])
        })
    }

    fn create_entrada(&self, input: &NewEntrada) -> Result<Entrada, StorageError> {
        self.with_session(|tx| {
            require_reference(tx, EntityKind::Producto, input.producto_id)?;
            tx.execute(
                "INSERT INTO entradas (producto_id, cantidad, fecha) VALUES (?1, ?2, ?3)",
                params![input.producto_id, input.cantidad, fecha_to_str(&input.fecha)],
            )
            .map_err(sql_err)?;
            Ok(input.clone().into_record(tx.last_insert_rowid()))
        })
    }

    fn get_entrada(&self, id: Id) -> Result<Entrada, StorageError> {
        self.with_session(|tx| fetch_by_id(tx, EntityKind::Entrada, ENTRADA_COLUMNS, id, entrada_from_row))
    }

    fn list_entradas(&self, page: Page) -> Result<Vec<Entrada>, StorageError> {
        self.with_session(|tx| fetch_page(tx, EntityKind::Entrada, ENTRADA_COLUMNS, page, entrada_from_row))
    }

    fn create_salida(&self, input: &NewSalida) -> Result<Salida, StorageError> {
        self.with_session(|tx| {
            require_reference(tx, EntityKind::Producto, input.producto_id)?;
            require_reference(tx, EntityKind::Cliente, input.cliente_id)?;
            tx.execute(
                "INSERT INTO salidas (producto_id, cliente_id, cantidad, fecha) VALUES (?1, ?2, ?3, ?4)",
                params![input.producto_id, input.cliente_id, input.cantidad, fecha_to_str(&input.fecha)],
            )
            .map_err(sql_err)?;
            Ok(input.clone().into_record(tx.last_insert_rowid()))
        })
    }

    fn get_salida(&self, id: Id) -> Result<Salida, StorageError> {
        self.with_session(|tx| fetch_by_id(tx, EntityKind::Salida, SALIDA_COLUMNS, id, salida_from_row))
    }

    fn list_salidas(&self, page: Page) -> Result<Vec<Salida>, StorageError> {
        self.with_session(|tx| fetch_page(tx, EntityKind::Salida, SALIDA_COLUMNS, page, salida_from_row))
    }

    fn create_proveedor(&self, input: &NewProveedor) -> Result<Proveedor, StorageError> {
        self.with_session(|tx| {
            tx.execute(
                "INSERT INTO proveedores (nombre, direccion, telefono, email) VALUES (?1, ?2, ?3, ?4)",
                params![input.nombre, input.direccion, input.telefono, input.email],
            )
            .map_err(sql_err)?;
            Ok(input.clone().into_record(tx.last_insert_rowid()))
        })
    }

    fn get_proveedor(&self, id: Id) -> Result<Proveedor, StorageError> {
        self.with_session(|tx| fetch_by_id(tx, EntityKind::Proveedor, PROVEEDOR_COLUMNS, id, proveedor_from_row))
    }

    fn list_proveedores(&self, page: Page) -> Result<Vec<Proveedor>, StorageError> {
        self.with_session(|tx| fetch_page(tx, EntityKind::Proveedor, PROVEEDOR_COLUMNS, page, proveedor_from_row))
    }

    fn entradas_between(&self, range: &DateRange) -> Result<Vec<Entrada>, StorageError> {
        let (from, to) = range.sql_bounds();
        let sql = format!(
            "SELECT {} FROM entradas WHERE fecha >= ?1 AND fecha <= ?2 ORDER BY fecha, id",
            ENTRADA_COLUMNS
        );
        self.with_session(|tx| fetch_all(tx, &sql, params![from, to], entrada_from_row))
    }

    fn salidas_between(&self, range: &DateRange) -> Result<Vec<Salida>, StorageError> {
        let (from, to) = range.sql_bounds();
        let sql = format!(
            "SELECT {} FROM salidas WHERE fecha >= ?1 AND fecha <= ?2 ORDER BY fecha, id",
            SALIDA_COLUMNS
        );
        self.with_session(|tx| fetch_all(tx, &sql, params![from, to], salida_from_row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::Month;

    fn storage() -> SqliteStorage {
        let storage = SqliteStorage::new(":memory:").unwrap();
        storage.materialize_schema().unwrap();
        storage
    }

    fn widget() -> NewProducto {
        NewProducto {
            nombre: Some("Widget".to_string()),
            descripcion: Some("Pieza de prueba".to_string()),
            precio: Some(dec!(9.99)),
            stock: Some(10),
        }
    }

    fn cliente() -> NewCliente {
        NewCliente {
            nombre: "Ana".to_string(),
            direccion: None,
            telefono: None,
            email: Some("ana@example.com".to_string()),
        }
    }

    fn fecha(month: Month, day: u8) -> Option<Date> {
        Some(Date::from_calendar_date(2024, month, day).unwrap())
    }

    #[test]
    fn test_schema_is_idempotent() {
        let storage = storage();
        storage.materialize_schema().unwrap();
        storage.create_producto(&widget()).unwrap();
        storage.materialize_schema().unwrap();
        assert_eq!(storage.list_productos(Page::new(0, 10)).unwrap().len(), 1);
    }

    #[test]
    fn test_sqlite_producto_lifecycle() {
        let storage = storage();
        let created = storage.create_producto(&widget()).unwrap();
        assert_eq!(created.id, 1);

        let loaded = storage.get_producto(created.id).unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.precio, Some(dec!(9.99)));

        let updated = storage
            .update_producto(created.id, &NewProducto { stock: Some(5), ..widget() })
            .unwrap();
        assert_eq!(updated.stock, Some(5));
        assert_eq!(storage.get_producto(created.id).unwrap().stock, Some(5));

        storage.delete_producto(created.id).unwrap();
        assert!(matches!(
            storage.get_producto(created.id),
            Err(StorageError::NotFound { entity: EntityKind::Producto, .. })
        ));
        assert!(matches!(storage.delete_producto(created.id), Err(StorageError::NotFound { .. })));

        // AUTOINCREMENT never hands out a deleted id again
        assert_eq!(storage.create_producto(&widget()).unwrap().id, 2);
    }

    #[test]
    fn test_sqlite_missing_ids() {
        let storage = storage();
        assert!(matches!(storage.get_cliente(999), Err(StorageError::NotFound { .. })));
        assert!(matches!(storage.update_cliente(999, &cliente()), Err(StorageError::NotFound { .. })));
        assert!(matches!(storage.delete_cliente(999), Err(StorageError::NotFound { .. })));
        assert!(matches!(storage.get_entrada(1), Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn test_sqlite_pagination_is_ordered() {
        let storage = storage();
        for _ in 0..7 {
            storage.create_cliente(&cliente()).unwrap();
        }
        let a = storage.list_clientes(Page::new(0, 3)).unwrap();
        let b = storage.list_clientes(Page::new(3, 3)).unwrap();
        let c = storage.list_clientes(Page::new(6, 3)).unwrap();
        let ids: Vec<Id> = a.iter().chain(&b).chain(&c).map(|c| c.id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
        assert_eq!(storage.list_clientes(Page::new(3, 3)).unwrap(), b);
    }

    #[test]
    fn test_sqlite_references() {
        let storage = storage();
        let err = storage
            .create_entrada(&NewEntrada { producto_id: 42, cantidad: Some(3), fecha: None })
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingReference { entity: EntityKind::Producto, id: 42 }));

        let p = storage.create_producto(&widget()).unwrap();
        let c = storage.create_cliente(&cliente()).unwrap();
        storage
            .create_entrada(&NewEntrada { producto_id: p.id, cantidad: Some(3), fecha: fecha(Month::January, 2) })
            .unwrap();

        assert!(matches!(
            storage.delete_producto(p.id),
            Err(StorageError::Referenced { by: EntityKind::Entrada, .. })
        ));

        storage
            .create_salida(&NewSalida { producto_id: p.id, cliente_id: c.id, cantidad: Some(1), fecha: None })
            .unwrap();
        assert!(matches!(
            storage.delete_cliente(c.id),
            Err(StorageError::Referenced { by: EntityKind::Salida, .. })
        ));
        assert!(storage.get_cliente(c.id).is_ok());
    }

    #[test]
    fn test_sqlite_reports() {
        let storage = storage();
        let p = storage.create_producto(&widget()).unwrap();
        let c = storage.create_cliente(&cliente()).unwrap();
        let fechas = [
            fecha(Month::January, 31),
            fecha(Month::January, 1),
            None,
            fecha(Month::February, 1),
            fecha(Month::January, 15),
        ];
        for f in fechas {
            storage
                .create_entrada(&NewEntrada { producto_id: p.id, cantidad: Some(1), fecha: f })
                .unwrap();
            storage
                .create_salida(&NewSalida { producto_id: p.id, cliente_id: c.id, cantidad: Some(1), fecha: f })
                .unwrap();
        }

        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        let entradas = storage.entradas_between(&range).unwrap();
        let ids: Vec<Id> = entradas.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 5, 1]);
        assert_eq!(entradas[0].fecha, fecha(Month::January, 1));

        let salidas = storage.salidas_between(&range).unwrap();
        assert_eq!(salidas.len(), 3);
        assert!(salidas.iter().all(|s| s.cliente_id == c.id));
    }
}
