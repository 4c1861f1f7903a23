use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use inventario::storage::{Page, StorageBackend};
use inventario_core::{Inventory, NewCliente, NewEntrada, NewProducto, NewSalida};
use inventario_sqlite::SqliteStorage;
use rust_decimal_macros::dec;
use time::{Date, Month};

const ROWS: i64 = 2_000;

fn setup() -> Inventory {
    let storage = SqliteStorage::new(":memory:").unwrap();
    storage.materialize_schema().unwrap();
    let inventory = Inventory::new(Arc::new(storage), 500);

    let producto = inventory
        .create_producto(&NewProducto {
            nombre: Some("tornillo".to_string()),
            descripcion: None,
            precio: Some(dec!(0.15)),
            stock: Some(10_000),
        })
        .unwrap();
    let cliente = inventory
        .create_cliente(&NewCliente {
            nombre: "Ferreteria Central".to_string(),
            direccion: None,
            telefono: None,
            email: None,
        })
        .unwrap();

    let first = Date::from_calendar_date(2024, Month::January, 1).unwrap();
    for i in 0..ROWS {
        let fecha = first.checked_add(time::Duration::days(i % 366));
        inventory
            .create_entrada(&NewEntrada {
                producto_id: producto.id,
                cantidad: Some(5),
                fecha,
            })
            .unwrap();
        inventory
            .create_salida(&NewSalida {
                producto_id: producto.id,
                cliente_id: cliente.id,
                cantidad: Some(1),
                fecha,
            })
            .unwrap();
    }
    inventory
}

fn bench_list_pages(c: &mut Criterion) {
    let inventory = setup();
    c.bench_function("list_entradas_page", |b| {
        b.iter(|| {
            let page = inventory
                .list_entradas(black_box(Page::new(1_000, 50)))
                .unwrap();
            black_box(page);
        })
    });
}

fn bench_reports(c: &mut Criterion) {
    let inventory = setup();
    c.bench_function("entradas_between_month", |b| {
        b.iter(|| {
            let rows = inventory
                .entradas_between(black_box("2024-03-01"), black_box("2024-03-31"))
                .unwrap();
            black_box(rows);
        })
    });
    c.bench_function("salidas_between_year", |b| {
        b.iter(|| {
            let rows = inventory
                .salidas_between(black_box("2024-01-01"), black_box("2024-12-31"))
                .unwrap();
            black_box(rows);
        })
    });
}

criterion_group!(benches, bench_list_pages, bench_reports);
criterion_main!(benches);
