/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

use crate::data::{to_kamel, Signal};
use std::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum IntWidth {
    W8,
    W16,
    W32,
}

impl IntWidth {
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
        }
    }
}

/// Storage representation of a decoded signal, resolved once per signal.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum StorageType {
    Integer { width: IntWidth, signed: bool },
    Float,
    /// Symbolic enumeration, carries the generated type name.
    Enum(String),
}

impl Default for StorageType {
    fn default() -> Self {
        StorageType::Integer { width: IntWidth::W8, signed: false }
    }
}

/// Resolve the storage type of `signal` declared within message `msg_name`.
///
/// A non integral scale literal always gives a float. Otherwise an
/// enumeration table (only attached to `FieldType` flagged signals) gives an
/// enum, else the smallest 8/16/32 bit integer holding `2^size * scale`
/// (doubled for signed storage). Storage is signed when the signal is
/// signed or any of its offset/scale is negative.
#[must_use]
pub fn resolve_storage(msg_name: &str, signal: &Signal) -> StorageType {
    if !signal.scale.is_integral() {
        return StorageType::Float;
    }

    if signal.is_enum() {
        return StorageType::Enum(format!("Dbc{}{}", to_kamel(msg_name), signal.get_type_kamel()));
    }

    let signed = signal.is_signed() || signal.offset.value < 0.0 || signal.scale.value < 0.0;
    let mut max = 2f64.powi(signal.bit_size as i32) * signal.scale.value.abs();
    if signed {
        max *= 2.0;
    }

    let width = if max <= 256.0 {
        IntWidth::W8
    } else if max <= 65536.0 {
        IntWidth::W16
    } else {
        IntWidth::W32
    };

    StorageType::Integer { width, signed }
}

impl StorageType {
    /// Type name as written in generated code.
    #[must_use]
    pub fn rust_type(&self) -> String {
        match self {
            StorageType::Integer { width, signed } => {
                format!("{}{}", if *signed { "i" } else { "u" }, width.bits())
            }
            StorageType::Float => "f32".to_owned(),
            StorageType::Enum(name) => name.clone(),
        }
    }

    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        matches!(self, StorageType::Integer { signed: false, .. })
    }

    /// Cast a physical value into this storage, with `as` semantics
    /// (truncation toward zero, saturation on overflow).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn cast(&self, physical: f64) -> DbcValue {
        match self {
            StorageType::Integer { width: IntWidth::W8, signed: false } => DbcValue::U8(physical as u8),
            StorageType::Integer { width: IntWidth::W16, signed: false } => {
                DbcValue::U16(physical as u16)
            }
            StorageType::Integer { width: IntWidth::W32, signed: false } => {
                DbcValue::U32(physical as u32)
            }
            StorageType::Integer { width: IntWidth::W8, signed: true } => DbcValue::I8(physical as i8),
            StorageType::Integer { width: IntWidth::W16, signed: true } => {
                DbcValue::I16(physical as i16)
            }
            StorageType::Integer { width: IntWidth::W32, signed: true } => {
                DbcValue::I32(physical as i32)
            }
            StorageType::Float => DbcValue::F32(physical as f32),
            StorageType::Enum(_) => DbcValue::Enum(physical as i64),
        }
    }

    /// Initial value of a field of this storage.
    #[must_use]
    pub fn zero(&self) -> DbcValue {
        self.cast(0.0)
    }
}

/// Decoded signal value, tagged with its storage kind.
#[derive(Copy, Clone, PartialEq)]
pub enum DbcValue {
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
    F32(f32),
    Enum(i64),
}

impl DbcValue {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        match *self {
            DbcValue::U8(val) => f64::from(val),
            DbcValue::U16(val) => f64::from(val),
            DbcValue::U32(val) => f64::from(val),
            DbcValue::I8(val) => f64::from(val),
            DbcValue::I16(val) => f64::from(val),
            DbcValue::I32(val) => f64::from(val),
            DbcValue::F32(val) => f64::from(val),
            DbcValue::Enum(val) => val as f64,
        }
    }
}

impl fmt::Display for DbcValue {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DbcValue::U8(val) => format!("{val}"),
            DbcValue::U16(val) => format!("{val}"),
            DbcValue::U32(val) => format!("{val}"),
            DbcValue::I8(val) => format!("{val}"),
            DbcValue::I16(val) => format!("{val}"),
            DbcValue::I32(val) => format!("{val}"),
            DbcValue::F32(val) => format!("{val}"),
            DbcValue::Enum(val) => format!("{val}"),
        };
        fmt.pad(&text)
    }
}

impl fmt::Debug for DbcValue {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbcValue::U8(val) => write!(fmt, "{val}(u8)"),
            DbcValue::U16(val) => write!(fmt, "{val}(u16)"),
            DbcValue::U32(val) => write!(fmt, "{val}(u32)"),
            DbcValue::I8(val) => write!(fmt, "{val}(i8)"),
            DbcValue::I16(val) => write!(fmt, "{val}(i16)"),
            DbcValue::I32(val) => write!(fmt, "{val}(i32)"),
            DbcValue::F32(val) => write!(fmt, "{val}(f32)"),
            DbcValue::Enum(val) => write!(fmt, "{val}(enum)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ByteOrder, DbcNumber, MuxRole, ValDescription, ValueType};

    fn signal(size: u32, signed: bool, scale: &str, offset: &str) -> Signal {
        Signal {
            name: "speed".to_owned(),
            bit_start: 0,
            bit_size: size,
            byte_order: ByteOrder::LittleEndian,
            value_type: if signed { ValueType::Signed } else { ValueType::Unsigned },
            scale: DbcNumber::new(scale, scale.parse().unwrap()),
            offset: DbcNumber::new(offset, offset.parse().unwrap()),
            min: DbcNumber::new("0", 0.0),
            max: DbcNumber::new("0", 0.0),
            unit: String::new(),
            receivers: Vec::new(),
            mux: MuxRole::Plain,
            field_type: false,
            enum_info: Vec::new(),
            storage: StorageType::default(),
        }
    }

    fn int(width: IntWidth, signed: bool) -> StorageType {
        StorageType::Integer { width, signed }
    }

    #[test]
    fn smallest_width_holds_range() {
        assert_eq!(resolve_storage("M", &signal(8, false, "1", "0")), int(IntWidth::W8, false));
        assert_eq!(resolve_storage("M", &signal(9, false, "1", "0")), int(IntWidth::W16, false));
        assert_eq!(resolve_storage("M", &signal(8, false, "2", "0")), int(IntWidth::W16, false));
        assert_eq!(resolve_storage("M", &signal(16, false, "1", "0")), int(IntWidth::W16, false));
        assert_eq!(resolve_storage("M", &signal(17, false, "1", "0")), int(IntWidth::W32, false));
    }

    #[test]
    fn signed_doubles_range() {
        assert_eq!(resolve_storage("M", &signal(7, true, "1", "0")), int(IntWidth::W8, true));
        assert_eq!(resolve_storage("M", &signal(8, true, "1", "0")), int(IntWidth::W16, true));
    }

    #[test]
    fn negative_offset_is_signed() {
        assert_eq!(resolve_storage("M", &signal(7, false, "1", "-64")), int(IntWidth::W8, true));
        // 0..255 - 40 does not fit an i8
        assert_eq!(resolve_storage("M", &signal(8, false, "1", "-40")), int(IntWidth::W16, true));
    }

    #[test]
    fn decimal_scale_is_float() {
        assert_eq!(resolve_storage("M", &signal(12, false, "0.1", "0")), StorageType::Float);
        assert_eq!(resolve_storage("M", &signal(12, false, "1.0", "0")), StorageType::Float);
    }

    #[test]
    fn enum_table_overrides_width() {
        let mut sig = signal(20, false, "1", "0");
        sig.enum_info.push(ValDescription { raw: 1, label: "ON".to_owned() });
        let storage = resolve_storage("DRIVER_HEARTBEAT", &sig);
        assert_eq!(storage, StorageType::Enum("DbcDriverHeartbeatSpeed".to_owned()));
        assert_eq!(storage.rust_type(), "DbcDriverHeartbeatSpeed");
    }

    #[test]
    fn cast_follows_storage() {
        assert_eq!(int(IntWidth::W8, true).cast(-1.0), DbcValue::I8(-1));
        assert_eq!(int(IntWidth::W16, false).cast(300.7), DbcValue::U16(300));
        assert_eq!(StorageType::Float.cast(2.5), DbcValue::F32(2.5));
        assert_eq!(StorageType::Enum("E".to_owned()).zero(), DbcValue::Enum(0));
        assert_eq!(int(IntWidth::W32, true).rust_type(), "i32");
    }
}
