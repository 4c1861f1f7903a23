//! Random demo rows for `POST /fill_data/`.

use inventario_core::{
    Inventory, NewCliente, NewEntrada, NewProducto, NewProveedor, NewSalida,
};
use rand::{seq::SliceRandom, Rng};
use rust_decimal::Decimal;
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::storage::StorageError;

pub const DEFAULT_COUNT: usize = 10;
pub const MAX_COUNT: usize = 1000;

const PRODUCTOS: &[&str] = &[
    "tornillo", "tuerca", "arandela", "bisagra", "clavo", "cable", "enchufe", "bombilla",
    "martillo", "llave", "cinta", "pegamento",
];
const NOMBRES: &[&str] = &["Ana", "Luis", "Carmen", "Jorge", "Lucia", "Pedro", "Elena", "Diego"];
const APELLIDOS: &[&str] = &["Garcia", "Lopez", "Martinez", "Sanchez", "Perez", "Gomez", "Ruiz"];
const CALLES: &[&str] = &["Calle Mayor", "Avenida del Sol", "Paseo de la Reforma", "Calle Luna"];

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FillSummary {
    pub productos: usize,
    pub clientes: usize,
    pub proveedores: usize,
    pub entradas: usize,
    pub salidas: usize,
}

fn pick<R: Rng>(rng: &mut R, words: &[&str]) -> String {
    words.choose(rng).copied().unwrap_or_default().to_string()
}

fn persona<R: Rng>(rng: &mut R) -> String {
    format!("{} {}", pick(rng, NOMBRES), pick(rng, APELLIDOS))
}

fn telefono<R: Rng>(rng: &mut R) -> String {
    format!("+34 6{:02} {:03} {:03}", rng.gen_range(0..100), rng.gen_range(0..1000), rng.gen_range(0..1000))
}

fn fecha_del_ano<R: Rng>(rng: &mut R, year: i32) -> Option<Date> {
    let day = rng.gen_range(1..=time::util::days_in_year(year));
    Date::from_ordinal_date(year, day).ok()
}

/// Inserts `count` productos and clientes (one proveedor per cliente) plus
/// `count` entradas and salidas referencing them, dated in the current year.
/// `count` is capped at [`MAX_COUNT`].
pub fn fill(inventory: &Inventory, count: usize) -> Result<FillSummary, StorageError> {
    let count = count.min(MAX_COUNT);
    let mut rng = rand::thread_rng();
    let year = OffsetDateTime::now_utc().year();
    let mut summary = FillSummary::default();

    let mut productos = Vec::with_capacity(count);
    for _ in 0..count {
        let nombre = pick(&mut rng, PRODUCTOS);
        let producto = inventory.create_producto(&NewProducto {
            descripcion: Some(format!("{} de uso general", nombre)),
            nombre: Some(nombre),
            precio: Some(Decimal::new(rng.gen_range(100..1_000_000), 2)),
            stock: Some(rng.gen_range(0..1000)),
        })?;
        productos.push(producto.id);
        summary.productos += 1;
    }

    let mut clientes = Vec::with_capacity(count);
    for _ in 0..count {
        let nombre = persona(&mut rng);
        let email = format!("{}@example.com", nombre.to_lowercase().replace(' ', "."));
        let cliente = inventory.create_cliente(&NewCliente {
            nombre,
            direccion: Some(format!("{} {}", pick(&mut rng, CALLES), rng.gen_range(1..200))),
            telefono: Some(telefono(&mut rng)),
            email: Some(email),
        })?;
        clientes.push(cliente.id);
        summary.clientes += 1;

        inventory.create_proveedor(&NewProveedor {
            nombre: format!("Suministros {}", pick(&mut rng, APELLIDOS)),
            direccion: None,
            telefono: Some(telefono(&mut rng)),
            email: None,
        })?;
        summary.proveedores += 1;
    }

    for _ in 0..count {
        let (Some(&producto_id), Some(&cliente_id)) = (productos.choose(&mut rng), clientes.choose(&mut rng)) else {
            break;
        };
        inventory.create_entrada(&NewEntrada {
            producto_id,
            cantidad: Some(rng.gen_range(1..100)),
            fecha: fecha_del_ano(&mut rng, year),
        })?;
        summary.entradas += 1;

        inventory.create_salida(&NewSalida {
            producto_id,
            cliente_id,
            cantidad: Some(rng.gen_range(1..50)),
            fecha: fecha_del_ano(&mut rng, year),
        })?;
        summary.salidas += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use inventario_memory::InMemoryStorage;

    use crate::storage::Page;

    #[test]
    fn test_fill_inserts_consistent_rows() {
        let inventory = Inventory::new(Arc::new(InMemoryStorage::new()), 500);
        let summary = fill(&inventory, 4).unwrap();
        assert_eq!(summary.productos, 4);
        assert_eq!(summary.clientes, 4);
        assert_eq!(summary.proveedores, 4);
        assert_eq!(summary.entradas, 4);
        assert_eq!(summary.salidas, 4);

        let salidas = inventory.list_salidas(Page::new(0, 100)).unwrap();
        for s in &salidas {
            assert!(inventory.get_producto(s.producto_id).is_ok());
            assert!(inventory.get_cliente(s.cliente_id).is_ok());
        }
    }

    #[test]
    fn test_fill_zero_is_noop() {
        let inventory = Inventory::new(Arc::new(InMemoryStorage::new()), 500);
        let summary = fill(&inventory, 0).unwrap();
        assert_eq!(summary.productos, 0);
        assert!(inventory.list_entradas(Page::new(0, 10)).unwrap().is_empty());
    }
}
