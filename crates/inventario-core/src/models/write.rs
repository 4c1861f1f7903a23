use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use time::Date;

use super::{fecha_in_range, Cliente, Entrada, Id, Producto, Proveedor, Salida};

pub const NOMBRE_PRODUCTO_MAX: usize = 100;
pub const DESCRIPCION_MAX: usize = 250;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("el campo '{0}' es obligatorio")]
    Blank(&'static str),
    #[error("el campo '{field}' admite como maximo {max} caracteres")]
    TooLong { field: &'static str, max: usize },
    #[error("el campo '{0}' no puede ser negativo")]
    Negative(&'static str),
    #[error("el campo '{0}' debe estar entre 0000-01-01 y 9999-12-31")]
    OutOfRange(&'static str),
}

fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Blank(field));
    }
    Ok(())
}

fn max_chars(field: &'static str, value: Option<&str>, max: usize) -> Result<(), ValidationError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong { field, max }),
        _ => Ok(()),
    }
}

fn fecha_storable(field: &'static str, value: Option<Date>) -> Result<(), ValidationError> {
    match value {
        Some(d) if !fecha_in_range(d) => Err(ValidationError::OutOfRange(field)),
        _ => Ok(()),
    }
}

fn non_negative(field: &'static str, value: Option<i64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if v < 0 => Err(ValidationError::Negative(field)),
        _ => Ok(()),
    }
}

/// Full field set of a product, used both for create and for update.
/// Fields left out of the request body are written as null.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewProducto {
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub descripcion: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub precio: Option<Decimal>,
    #[serde(default)]
    pub stock: Option<i64>,
}

impl NewProducto {
    pub fn validate(&self) -> Result<(), ValidationError> {
        max_chars("nombre", self.nombre.as_deref(), NOMBRE_PRODUCTO_MAX)?;
        max_chars("descripcion", self.descripcion.as_deref(), DESCRIPCION_MAX)?;
        if matches!(self.precio, Some(p) if p.is_sign_negative() && !p.is_zero()) {
            return Err(ValidationError::Negative("precio"));
        }
        non_negative("stock", self.stock)
    }

    pub fn into_record(self, id: Id) -> Producto {
        Producto {
            id,
            nombre: self.nombre,
            descripcion: self.descripcion,
            precio: self.precio,
            stock: self.stock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCliente {
    pub nombre: String,
    #[serde(default)]
    pub direccion: Option<String>,
    #[serde(default)]
    pub telefono: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl NewCliente {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("nombre", &self.nombre)
    }

    pub fn into_record(self, id: Id) -> Cliente {
        Cliente {
            id,
            nombre: self.nombre,
            direccion: self.direccion,
            telefono: self.telefono,
            email: self.email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewEntrada {
    pub producto_id: Id,
    #[serde(default)]
    pub cantidad: Option<i64>,
    #[serde(default, with = "super::fecha_serde")]
    pub fecha: Option<Date>,
}

impl NewEntrada {
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_negative("cantidad", self.cantidad)?;
        fecha_storable("fecha", self.fecha)
    }

    pub fn into_record(self, id: Id) -> Entrada {
        Entrada {
            id,
            producto_id: self.producto_id,
            cantidad: self.cantidad,
            fecha: self.fecha,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewSalida {
    pub producto_id: Id,
    pub cliente_id: Id,
    #[serde(default)]
    pub cantidad: Option<i64>,
    #[serde(default, with = "super::fecha_serde")]
    pub fecha: Option<Date>,
}

impl NewSalida {
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_negative("cantidad", self.cantidad)?;
        fecha_storable("fecha", self.fecha)
    }

    pub fn into_record(self, id: Id) -> Salida {
        Salida {
            id,
            producto_id: self.producto_id,
            cliente_id: self.cliente_id,
            cantidad: self.cantidad,
            fecha: self.fecha,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewProveedor {
    pub nombre: String,
    #[serde(default)]
    pub direccion: Option<String>,
    #[serde(default)]
    pub telefono: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl NewProveedor {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("nombre", &self.nombre)
    }

    pub fn into_record(self, id: Id) -> Proveedor {
        Proveedor {
            id,
            nombre: self.nombre,
            direccion: self.direccion,
            telefono: self.telefono,
            email: self.email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_producto_rejects_negative_stock() {
        let p = NewProducto { stock: Some(-1), ..Default::default() };
        assert_eq!(p.validate(), Err(ValidationError::Negative("stock")));

        let p = NewProducto { precio: Some(dec!(-0.01)), ..Default::default() };
        assert_eq!(p.validate(), Err(ValidationError::Negative("precio")));

        let p = NewProducto { precio: Some(dec!(0)), stock: Some(0), ..Default::default() };
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_producto_length_limits() {
        let p = NewProducto { nombre: Some("x".repeat(101)), ..Default::default() };
        assert_eq!(
            p.validate(),
            Err(ValidationError::TooLong { field: "nombre", max: 100 })
        );
        let p = NewProducto { descripcion: Some("ñ".repeat(250)), ..Default::default() };
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_cliente_requires_nombre() {
        let c = NewCliente {
            nombre: "   ".to_string(),
            direccion: None,
            telefono: None,
            email: None,
        };
        assert_eq!(c.validate(), Err(ValidationError::Blank("nombre")));
    }

    #[test]
    fn test_missing_fields_deserialize_as_null() {
        let p: NewProducto = serde_json::from_str(r#"{"nombre":"Widget","precio":9.99}"#).unwrap();
        assert_eq!(p.nombre.as_deref(), Some("Widget"));
        assert!(p.precio.is_some());
        assert!(p.stock.is_none());
        assert!(p.descripcion.is_none());

        let e: NewEntrada = serde_json::from_str(r#"{"producto_id":4,"fecha":"2024-01-02"}"#).unwrap();
        assert_eq!(e.producto_id, 4);
        assert!(e.fecha.is_some());

        let bad = serde_json::from_str::<NewEntrada>(r#"{"producto_id":4,"fecha":"02/01/2024"}"#);
        assert!(bad.is_err());
        let signed = serde_json::from_str::<NewSalida>(
            r#"{"producto_id":4,"cliente_id":1,"fecha":"-0001-01-01"}"#,
        );
        assert!(signed.is_err());
    }

    #[test]
    fn test_negative_year_fecha_is_rejected() {
        let fecha = Date::from_calendar_date(-5, time::Month::June, 1).ok();
        let e = NewEntrada { producto_id: 1, cantidad: Some(1), fecha };
        assert_eq!(e.validate(), Err(ValidationError::OutOfRange("fecha")));
        let s = NewSalida { producto_id: 1, cliente_id: 1, cantidad: None, fecha };
        assert_eq!(s.validate(), Err(ValidationError::OutOfRange("fecha")));
    }
}
