/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
*/
extern crate dbcgen;

use dbcgen::prelude::*;
use std::env;
use std::path::Path;

fn main() {
    let dbcfile = concat!(env!("CARGO_MANIFEST_DIR"), "/../etc/sample.dbc");

    // invalidate the built crate whenever the dbc changes
    println!("cargo:rerun-if-changed={dbcfile}");

    let header = "// -----------------------------------------------------------------------
//   <- etc/sample.dbc encode/decode module, regenerated by cargo ->
//   Check build.rs for the node and options this module is built for.
// -----------------------------------------------------------------------";

    let outdir = env::var("OUT_DIR").expect("cargo should provide OUT_DIR");
    let outfile = Path::new(&outdir).join("__sample-dbcgen.rs");

    DbcCompiler::new("dbc_sample")
        .dbcfile(dbcfile)
        .outfile(outfile.to_str().expect("OUT_DIR should be valid utf-8"))
        .self_node("IO")
        .gen_all(true)
        .header(header)
        .generate()
        .expect("fail to generate etc/sample.dbc module");
}
