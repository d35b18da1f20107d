/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

use std::fmt;
use std::io;

/// Fatal compilation error. The first one raised aborts the whole run and no
/// artifact is produced.
#[derive(Debug, thiserror::Error)]
pub enum DbcError {
    /// Requested self node is not part of the `BU_:` node list.
    #[error("self node:{node} not found in BU_ node list")]
    Configuration { node: String },

    /// Message level violation (id, length, record placement).
    #[error("record:{record} {info}")]
    Structural { uid: &'static str, record: String, info: String },

    /// Signal level violation (width, frame fit, multiplexing, value range).
    #[error("signal:{signal} {info}")]
    Validation { uid: &'static str, signal: String, info: String },

    /// A recognised record whose syntax cannot be decoded.
    #[error("line:{line} {info}")]
    Parsing { line: usize, info: String },

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("fail to emit generated code")]
    Emit(#[from] fmt::Error),
}

impl DbcError {
    pub fn structural<T: Into<String>>(uid: &'static str, record: T, info: String) -> Self {
        DbcError::Structural { uid, record: record.into(), info }
    }

    pub fn validation<T: Into<String>>(uid: &'static str, signal: T, info: String) -> Self {
        DbcError::Validation { uid, signal: signal.into(), info }
    }

    /// Stable short identifier, usable to match an error without parsing its text.
    #[must_use]
    pub fn uid(&self) -> &'static str {
        match self {
            DbcError::Configuration { .. } => "self-node-missing",
            DbcError::Structural { uid, .. } | DbcError::Validation { uid, .. } => uid,
            DbcError::Parsing { .. } => "parsing-fail",
            DbcError::Io(_) => "io-error",
            DbcError::Emit(_) => "emit-fail",
        }
    }

    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, DbcError::Configuration { .. })
    }

    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, DbcError::Structural { .. })
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, DbcError::Validation { .. })
    }
}
