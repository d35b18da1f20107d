/*
 * Copyright (C) 2018 Marcel Buesing (MIT License)
 * Origin: https://github.com/marcelbuesing/can-dbc
 *
 * Adaptation (2022) to Redpesk and LibAfb model
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

#![doc(
    html_logo_url = "https://iot.bzh/images/defaults/company/512-479-max-transp.png",
    html_favicon_url = "https://iot.bzh/images/defaults/favicon.ico"
)]

extern crate nom;

#[path = "dbc-error.rs"]
pub mod error;

#[path = "dbc-data.rs"]
pub mod data;

#[path = "dbc-types.rs"]
pub mod types;

#[path = "dbc-mux.rs"]
pub mod mux;

#[path = "dbc-parser.rs"]
pub mod parser;

#[path = "dbc-codec.rs"]
pub mod codec;

#[path = "dbc-mia.rs"]
pub mod mia;

#[path = "dbc-planner.rs"]
pub mod planner;

#[path = "dbc-gencode.rs"]
pub mod gencode;

pub use crate::data::*;
pub use crate::error::DbcError;
pub use crate::gencode::{DbcCompiler, DbcCodeGen};
pub use crate::parser::dbc_from_str;

/// `use dbcgen::prelude::*;` brings the model, codec and generator in scope.
pub mod prelude {
    pub use crate::codec::*;
    pub use crate::data::*;
    pub use crate::error::*;
    pub use crate::gencode::*;
    pub use crate::mia::*;
    pub use crate::mux::*;
    pub use crate::parser::dbc_from_str;
    pub use crate::planner::*;
    pub use crate::types::*;
}
