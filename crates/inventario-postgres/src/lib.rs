use std::{
    str::FromStr,
    sync::{Mutex, MutexGuard},
};

use inventario_core::{
    models::{format_fecha, parse_fecha},
    Cliente, DateRange, EntityKind, Entrada, Id, NewCliente, NewEntrada, NewProducto,
    NewProveedor, NewSalida, Page, Producto, Proveedor, Salida, StorageBackend, StorageError,
};
use postgres::{Client, NoTls, Row, Transaction};
use rust_decimal::Decimal;
use time::Date;

const PRODUCTO_COLUMNS: &str = "id, nombre, descripcion, precio, stock";
const CLIENTE_COLUMNS: &str = "id, nombre, direccion, telefono, email";
const ENTRADA_COLUMNS: &str = "id, producto_id, cantidad, fecha";
const SALIDA_COLUMNS: &str = "id, producto_id, cliente_id, cantidad, fecha";
const PROVEEDOR_COLUMNS: &str = "id, nombre, direccion, telefono, email";

type RowMapper<T> = fn(&Row) -> Result<T, StorageError>;

pub struct PostgresStorage {
    client: Mutex<Client>,
}

impl PostgresStorage {
    /// Opens the single connection this backend uses. Must not be called from
    /// an async worker thread; the sync client drives its own runtime.
    pub fn new(connection_string: &str) -> Result<Self, StorageError> {
        let client = Client::connect(connection_string, NoTls)
            .map_err(|e| StorageError::Unavailable(format!("PostgreSQL connection failed: {}", e)))?;
        tracing::debug!("PostgreSQL connection established");
        Ok(Self {
            client: Mutex::new(client),
        })
    }

    fn client(&self) -> Result<MutexGuard<'_, Client>, StorageError> {
        let client = self
            .client
            .lock()
            .map_err(|_| StorageError::Unavailable("postgres client poisoned".to_string()))?;
        if client.is_closed() {
            return Err(StorageError::Unavailable("PostgreSQL connection closed".to_string()));
        }
        Ok(client)
    }

    /// Runs `f` inside one transaction; dropping it on error rolls back.
    fn with_session<T>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(pg_err)?;
        let out = f(&mut tx)?;
        tx.commit().map_err(pg_err)?;
        Ok(out)
    }
}

fn pg_err(e: postgres::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

fn decimal_to_str(d: &Option<Decimal>) -> Option<String> {
    d.as_ref().map(|d| d.to_string())
}

fn fecha_to_str(d: &Option<Date>) -> Option<String> {
    d.map(format_fecha)
}

fn decimal_column(row: &Row, idx: usize) -> Result<Option<Decimal>, StorageError> {
    let raw: Option<String> = row.try_get(idx).map_err(pg_err)?;
    raw.map(|s| {
        Decimal::from_str(&s).map_err(|e| StorageError::Other(format!("Invalid decimal: {}", e)))
    })
    .transpose()
}

fn fecha_column(row: &Row, idx: usize) -> Result<Option<Date>, StorageError> {
    let raw: Option<String> = row.try_get(idx).map_err(pg_err)?;
    raw.map(|s| parse_fecha(&s).ok_or_else(|| StorageError::Other(format!("Invalid fecha: {}", s))))
        .transpose()
}

fn producto_from_row(row: &Row) -> Result<Producto, StorageError> {
    Ok(Producto {
        id: row.try_get(0).map_err(pg_err)?,
        nombre: row.try_get(1).map_err(pg_err)?,
        descripcion: row.try_get(2).map_err(pg_err)?,
        precio: decimal_column(row, 3)?,
        stock: row.try_get(4).map_err(pg_err)?,
    })
}

fn cliente_from_row(row: &Row) -> Result<Cliente, StorageError> {
    Ok(Cliente {
        id: row.try_get(0).map_err(pg_err)?,
        nombre: row.try_get(1).map_err(pg_err)?,
        direccion: row.try_get(2).map_err(pg_err)?,
        telefono: row.try_get(3).map_err(pg_err)?,
        email: row.try_get(4).map_err(pg_err)?,
    })
}

fn entrada_from_row(row: &Row) -> Result<Entrada, StorageError> {
    Ok(Entrada {
        id: row.try_get(0).map_err(pg_err)?,
        producto_id: row.try_get(1).map_err(pg_err)?,
        cantidad: row.try_get(2).map_err(pg_err)?,
        fecha: fecha_column(row, 3)?,
    })
}

fn salida_from_row(row: &Row) -> Result<Salida, StorageError> {
    Ok(Salida {
        id: row.try_get(0).map_err(pg_err)?,
        producto_id: row.try_get(1).map_err(pg_err)?,
        cliente_id: row.try_get(2).map_err(pg_err)?,
        cantidad: row.try_get(3).map_err(pg_err)?,
        fecha: fecha_column(row, 4)?,
    })
}

fn proveedor_from_row(row: &Row) -> Result<Proveedor, StorageError> {
    Ok(Proveedor {
        id: row.try_get(0).map_err(pg_err)?,
        nombre: row.try_get(1).map_err(pg_err)?,
        direccion: row.try_get(2).map_err(pg_err)?,
        telefono: row.try_get(3).map_err(pg_err)?,
        email: row.try_get(4).map_err(pg_err)?,
    })
}

fn fetch_by_id<T>(
    tx: &mut Transaction<'_>,
    kind: EntityKind,
    columns: &str,
    id: Id,
    map: RowMapper<T>,
) -> Result<T, StorageError> {
    let sql = format!("SELECT {} FROM {} WHERE id = $1", columns, kind.table());
    match tx.query_opt(sql.as_str(), &[&id]).map_err(pg_err)? {
        Some(row) => map(&row),
        None => Err(StorageError::not_found(kind, id)),
    }
}

fn fetch_page<T>(
    tx: &mut Transaction<'_>,
    kind: EntityKind,
    columns: &str,
    page: Page,
    map: RowMapper<T>,
) -> Result<Vec<T>, StorageError> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY id LIMIT $1 OFFSET $2",
        columns,
        kind.table()
    );
    let rows = tx
        .query(sql.as_str(), &[&page.sql_limit(), &page.sql_offset()])
        .map_err(pg_err)?;
    rows.iter().map(map).collect()
}

fn row_exists(tx: &mut Transaction<'_>, table: &str, column: &str, id: Id) -> Result<bool, StorageError> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE {} = $1)", table, column);
    let row = tx.query_one(sql.as_str(), &[&id]).map_err(pg_err)?;
    row.try_get(0).map_err(pg_err)
}

fn require_reference(tx: &mut Transaction<'_>, kind: EntityKind, id: Id) -> Result<(), StorageError> {
    if !row_exists(tx, kind.table(), "id", id)? {
        return Err(StorageError::MissingReference { entity: kind, id });
    }
    Ok(())
}

fn delete_restricted(
    tx: &mut Transaction<'_>,
    kind: EntityKind,
    id: Id,
    referenced_by: &[(EntityKind, &str)],
) -> Result<(), StorageError> {
    if !row_exists(tx, kind.table(), "id", id)? {
        return Err(StorageError::not_found(kind, id));
    }
    for (by, column) in referenced_by {
        if row_exists(tx, by.table(), column, id)? {
            return Err(StorageError::Referenced { entity: kind, id, by: *by });
        }
    }
    let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
    tx.execute(sql.as_str(), &[&id]).map_err(pg_err)?;
    tracing::debug!(entity = %kind, id, "Row deleted");
    Ok(())
}

fn inserted_id(row: &Row) -> Result<Id, StorageError> {
    row.try_get(0).map_err(pg_err)
}

impl StorageBackend for PostgresStorage {
    fn materialize_schema(&self) -> Result<(), StorageError> {
        let mut client = self.client()?;
        client
            .batch_execute(
                "
            CREATE TABLE IF NOT EXISTS productos (
                id BIGSERIAL PRIMARY KEY,
                nombre VARCHAR(100),
                descripcion VARCHAR(250),
                precio TEXT,
                stock BIGINT
            );

            CREATE INDEX IF NOT EXISTS idx_pg_productos_nombre
                ON productos(nombre);

            CREATE TABLE IF NOT EXISTS clientes (
                id BIGSERIAL PRIMARY KEY,
                nombre TEXT NOT NULL,
                direccion TEXT,
                telefono TEXT,
                email TEXT
            );

            CREATE TABLE IF NOT EXISTS entradas (
                id BIGSERIAL PRIMARY KEY,
                producto_id BIGINT NOT NULL REFERENCES productos(id) ON DELETE RESTRICT,
                cantidad BIGINT,
                fecha TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_pg_entradas_fecha
                ON entradas(fecha);

            CREATE TABLE IF NOT EXISTS salidas (
                id BIGSERIAL PRIMARY KEY,
                producto_id BIGINT NOT NULL REFERENCES productos(id) ON DELETE RESTRICT,
                cliente_id BIGINT NOT NULL REFERENCES clientes(id) ON DELETE RESTRICT,
                cantidad BIGINT,
                fecha TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_pg_salidas_fecha
                ON salidas(fecha);

            CREATE TABLE IF NOT EXISTS proveedores (
                id BIGSERIAL PRIMARY KEY,
                nombre TEXT NOT NULL,
                direccion TEXT,
                telefono TEXT,
                email TEXT
            );
            ",
            )
            .map_err(pg_err)?;
        tracing::info!("PostgreSQL schema ready");
        Ok(())
    }

    fn create_producto(&self, input: &NewProducto) -> Result<Producto, StorageError> {
        self.with_session(|tx| {
            let row = tx
                .query_one(
                    "INSERT INTO productos (nombre, descripcion, precio, stock) VALUES ($1, $2, $3, $4) RETURNING id",
                    &[&input.nombre, &input.descripcion, &decimal_to_str(&input.precio), &input.stock],
                )
                .map_err(pg_err)?;
            let id = inserted_id(&row)?;
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
                    "UPDATE productos SET nombre = $1, descripcion = $2, precio = $3, stock = $4 WHERE id = $5",
                    &[&input.nombre, &input.descripcion, &decimal_to_str(&input.precio), &input.stock, &id],
                )
                .map_err(pg_err)?;
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
            let row = tx
                .query_one(
                    "INSERT INTO clientes (nombre, direccion, telefono, email) VALUES ($1, $2, $3, $4) RETURNING id",
                    &[&input.nombre, &input.direccion, &input.telefono, &input.email],
                )
                .map_err(pg_err)?;
            let id = inserted_id(&row)?;
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
                    "UPDATE clientes SET nombre = $1, direccion = $2, telefono = $3, email = $4 WHERE id = $5",
                    &[&input.nombre, &input.direccion, &input.telefono, &input.email, &id],
                )
                .map_err(pg_err)?;
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
            let row = tx
                .query_one(
                    "INSERT INTO entradas (producto_id, cantidad, fecha) VALUES ($1, $2, $3) RETURNING id",
                    &[&input.producto_id, &input.cantidad, &fecha_to_str(&input.fecha)],
                )
                .map_err(pg_err)?;
            Ok(input.clone().into_record(inserted_id(&row)?))
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
            let row = tx
                .query_one(
                    "INSERT INTO salidas (producto_id, cliente_id, cantidad, fecha) VALUES ($1, $2, $3, $4) RETURNING id",
                    &[&input.producto_id, &input.cliente_id, &input.cantidad, &fecha_to_str(&input.fecha)],
                )
                .map_err(pg_err)?;
            Ok(input.clone().into_record(inserted_id(&row)?))
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
            let row = tx
                .query_one(
                    "INSERT INTO proveedores (nombre, direccion, telefono, email) VALUES ($1, $2, $3, $4) RETURNING id",
                    &[&input.nombre, &input.direccion, &input.telefono, &input.email],
                )
                .map_err(pg_err)?;
            Ok(input.clone().into_record(inserted_id(&row)?))
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
            "SELECT {} FROM entradas WHERE fecha >= $1 AND fecha <= $2 ORDER BY fecha, id",
            ENTRADA_COLUMNS
        );
        self.with_session(|tx| {
            let rows = tx.query(sql.as_str(), &[&from, &to]).map_err(pg_err)?;
            rows.iter().map(entrada_from_row).collect()
        })
    }

    fn salidas_between(&self, range: &DateRange) -> Result<Vec<Salida>, StorageError> {
        let (from, to) = range.sql_bounds();
        let sql = format!(
            "SELECT {} FROM salidas WHERE fecha >= $1 AND fecha <= $2 ORDER BY fecha, id",
            SALIDA_COLUMNS
        );
        self.with_session(|tx| {
            let rows = tx.query(sql.as_str(), &[&from, &to]).map_err(pg_err)?;
            rows.iter().map(salida_from_row).collect()
        })
    }
}
