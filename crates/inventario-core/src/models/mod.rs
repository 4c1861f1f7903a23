use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{format_description::FormatItem, macros::format_description, Date};

pub mod write;

/// Surrogate key shared by every table.
pub type Id = i64;

const FECHA_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Renders a calendar date as `YYYY-MM-DD`, the form used both on the wire
/// and in the text columns of the SQL backends. Only dates in years
/// 0000..=9999 round-trip through [`parse_fecha`]; inputs are validated to
/// that range before they are stored.
pub fn format_fecha(d: Date) -> String {
    d.format(FECHA_FORMAT).unwrap_or_else(|_| d.to_string())
}

/// Parses a strict `YYYY-MM-DD` calendar date. Signs, short fields, trailing
/// time components and impossible days are all rejected.
pub fn parse_fecha(s: &str) -> Option<Date> {
    let bytes = s.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return None;
    }
    Date::parse(s, FECHA_FORMAT).ok()
}

/// True when `d` formats to a string [`parse_fecha`] accepts.
pub fn fecha_in_range(d: Date) -> bool {
    (0..=9999).contains(&d.year())
}

/// Serde adapter for `Option<Date>` fields. Reads with [`parse_fecha`] and
/// writes with [`format_fecha`], so the wire and the stored text share one
/// grammar.
pub(crate) mod fecha_serde {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(value: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&super::format_fecha(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Date>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            super::parse_fecha(&s).ok_or_else(|| {
                de::Error::custom(format!("fecha invalida '{}', se espera el formato YYYY-MM-DD", s))
            })
        })
        .transpose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Producto,
    Cliente,
    Entrada,
    Salida,
    Proveedor,
}

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Producto => "productos",
            EntityKind::Cliente => "clientes",
            EntityKind::Entrada => "entradas",
            EntityKind::Salida => "salidas",
            EntityKind::Proveedor => "proveedores",
        }
    }

    /// Human readable message returned to API callers for a missing row.
    pub fn not_found_message(&self) -> &'static str {
        match self {
            EntityKind::Producto => "Producto no encontrado",
            EntityKind::Cliente => "Cliente no encontrado",
            EntityKind::Entrada => "Entrada no encontrada",
            EntityKind::Salida => "Salida no encontrada",
            EntityKind::Proveedor => "Proveedor no encontrado",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Producto => "Producto",
            EntityKind::Cliente => "Cliente",
            EntityKind::Entrada => "Entrada",
            EntityKind::Salida => "Salida",
            EntityKind::Proveedor => "Proveedor",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producto {
    pub id: Id,
    pub nombre: Option<String>,
    pub descripcion: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub precio: Option<Decimal>,
    pub stock: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cliente {
    pub id: Id,
    pub nombre: String,
    pub direccion: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
}

/// Stock received for one product. Serializes to the flat field map the
/// entradas report returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrada {
    pub id: Id,
    pub producto_id: Id,
    pub cantidad: Option<i64>,
    #[serde(default, with = "fecha_serde")]
    pub fecha: Option<Date>,
}

/// Stock shipped to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Salida {
    pub id: Id,
    pub producto_id: Id,
    pub cliente_id: Id,
    pub cantidad: Option<i64>,
    #[serde(default, with = "fecha_serde")]
    pub fecha: Option<Date>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proveedor {
    pub id: Id,
    pub nombre: String,
    pub direccion: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::Month;

    #[test]
    fn test_parse_fecha_strict() {
        let d = parse_fecha("2024-01-31").unwrap();
        assert_eq!(d, Date::from_calendar_date(2024, Month::January, 31).unwrap());

        assert!(parse_fecha("2024-1-31").is_none());
        assert!(parse_fecha("2024-02-30").is_none());
        assert!(parse_fecha("2024-01-31T00:00:00").is_none());
        assert!(parse_fecha("+024-01-31").is_none());
        assert!(parse_fecha("").is_none());
        assert!(parse_fecha("-001-01-01").is_none());
        assert!(parse_fecha("2024-13-01").is_none());
    }

    #[test]
    fn test_fecha_rejects_signed_years_on_the_wire() {
        for body in [
            r#"{"id":1,"producto_id":1,"cantidad":null,"fecha":"-0001-01-01"}"#,
            r#"{"id":1,"producto_id":1,"cantidad":null,"fecha":"+2024-01-01"}"#,
            r#"{"id":1,"producto_id":1,"cantidad":null,"fecha":"10000-01-01"}"#,
        ] {
            assert!(serde_json::from_str::<Entrada>(body).is_err(), "accepted {}", body);
        }
        let ok: Entrada =
            serde_json::from_str(r#"{"id":1,"producto_id":1,"cantidad":2,"fecha":"0000-02-29"}"#).unwrap();
        assert_eq!(format_fecha(ok.fecha.unwrap()), "0000-02-29");
    }

    #[test]
    fn test_fecha_range_matches_the_parser() {
        let negative = Date::from_calendar_date(-1, Month::January, 1).unwrap();
        assert!(!fecha_in_range(negative));
        assert!(parse_fecha(&format_fecha(negative)).is_none());

        let last = Date::from_calendar_date(9999, Month::December, 31).unwrap();
        assert!(fecha_in_range(last));
        assert_eq!(parse_fecha(&format_fecha(last)), Some(last));
    }

    #[test]
    fn test_format_fecha_pads() {
        let d = Date::from_calendar_date(987, Month::March, 4).unwrap();
        assert_eq!(format_fecha(d), "0987-03-04");
    }

    #[test]
    fn test_entrada_serializes_iso_fecha() {
        let entrada = Entrada {
            id: 3,
            producto_id: 1,
            cantidad: Some(12),
            fecha: Some(Date::from_calendar_date(2024, Month::January, 15).unwrap()),
        };
        let json = serde_json::to_value(&entrada).unwrap();
        assert_eq!(json["fecha"], "2024-01-15");
        assert_eq!(json["producto_id"], 1);

        let sin_fecha = Entrada { fecha: None, ..entrada };
        let json = serde_json::to_value(&sin_fecha).unwrap();
        assert!(json["fecha"].is_null());
    }

    #[test]
    fn test_producto_precio_is_a_json_number() {
        let producto = Producto {
            id: 1,
            nombre: Some("Widget".to_string()),
            descripcion: None,
            precio: Some(dec!(9.99)),
            stock: Some(10),
        };
        let json = serde_json::to_value(&producto).unwrap();
        let precio = json["precio"].as_f64().unwrap();
        assert!((precio - 9.99).abs() < 1e-9);
    }
}
