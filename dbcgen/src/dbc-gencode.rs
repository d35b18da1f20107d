/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Source code derivate from: (MIT || Apache2 License)
 *  - https://github.com/technocreatives/dbc-codegen Copyright: Marcel Buesing, Pascal Hertleif, Andres Vahter, ...
 *  - https://github.com/marcelbuesing/can-dbc Copyright: Marcel Buesing (MIT License)
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
 * Reference: http://mcu.so/Microcontroller/Automotive/dbc-file-format-documentation_compress.pdf
 */
use crate::codec::{BitLayout, ByteStep, SignalCodec};
use crate::data::{DbcObject, Message, MessageId, Signal};
use crate::error::DbcError;
use crate::mux::{GroupNames, MuxLayout};
use crate::planner::{EmitScope, MessagePlan};
use crate::types::StorageType;

use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::fs;
use std::io::{self, Write};

const IDT0: &str = "";
const IDT1: &str = "    ";
const IDT2: &str = "        ";
const IDT3: &str = "            ";
const IDT4: &str = "                ";

/// Host transmit primitive the generated `dbc_encode_and_send_*` routines call.
pub const DBC_APP_SEND: &str = "dbc_app_send_can_msg";

#[macro_export]
macro_rules! code_output {
 ($code:ident, $indent:ident, $format:expr, $( $args:expr ),*) => {
    $code.output ($indent,  format! ($format, $($args),*))
 };
 ($code:ident, $indent:ident,$format:expr) => {
    $code.output ($indent, $format)
 }
}

/// f64 as a Rust literal (`1.0`, `0.1`, `-40.0`, `1e-5`).
fn lit(value: f64) -> String {
    format!("{value:?}")
}

pub struct DbcCodeGen<'a> {
    dbcfd: &'a DbcObject,
    scope: &'a EmitScope,
    serde: bool,
    text: RefCell<String>,
}

pub trait SigCodeGen<T> {
    /// Structure field with its bit range comment.
    ///
    /// # Errors
    /// Formatter failure.
    fn gen_signal_field(&self, code: T) -> fmt::Result;
    fn gen_signal_enum(&self, code: T, msg: &Message) -> fmt::Result;
    fn gen_signal_encode(&self, code: T, from: &str) -> fmt::Result;
    fn gen_signal_decode(&self, code: T, to: &str, indent: &str) -> fmt::Result;
}

pub trait MsgCodeGen<T> {
    fn gen_msg_header(&self, code: T, plan: &MessagePlan) -> fmt::Result;
    fn gen_msg_enums(&self, code: T, plan: &MessagePlan) -> fmt::Result;
    fn gen_msg_struct(&self, code: T, plan: &MessagePlan) -> fmt::Result;
    fn gen_msg_encode(&self, code: T, plan: &MessagePlan) -> fmt::Result;
    fn gen_msg_decode(&self, code: T, plan: &MessagePlan) -> fmt::Result;
    fn gen_msg_mia(&self, code: T, plan: &MessagePlan) -> fmt::Result;
}

impl ByteStep {
    /// Bits of `raw` held by this step, in place for `bytes[byte] |= ..`.
    fn pack_expr(&self) -> String {
        let mut expr = if self.raw_shift == 0 {
            "(raw as u8)".to_owned()
        } else {
            format!("((raw >> {}) as u8)", self.raw_shift)
        };
        expr = format!("{expr} & 0x{:02x}", self.mask());
        if self.bit != 0 {
            expr = format!("({expr}) << {}", self.bit);
        }
        expr
    }

    /// Frame bits of this step as a `u32` at their raw position.
    fn unpack_expr(&self) -> String {
        let mut part = format!("bytes[{}]", self.byte);
        if self.bit != 0 {
            part = format!("({part} >> {})", self.bit);
        }
        if self.width != 8 {
            part = format!("{part} & 0x{:02x}", self.mask());
        }
        let mut expr = format!("u32::from({part})");
        if self.raw_shift != 0 {
            expr = format!("{expr} << {}", self.raw_shift);
        }
        expr
    }

    fn first_bit(&self) -> usize {
        self.byte * 8 + self.bit as usize
    }
}

impl Signal {
    fn bit_range(&self) -> String {
        format!("B{}:{}", self.bit_end() - 1, self.bit_start)
    }

    fn encode_raw_expr(codec: &SignalCodec) -> String {
        let mut expr = "value".to_owned();
        if codec.offset != 0.0 {
            expr = format!("(value - ({}))", lit(codec.offset));
        }
        if codec.scale != 1.0 {
            expr = format!("({expr} / {})", lit(codec.scale));
        }
        format!("{expr}.round()")
    }

    fn decode_value_expr(&self, codec: &SignalCodec) -> String {
        let mut expr = if codec.signed { "f64::from(raw as i32)".to_owned() } else { "f64::from(raw)".to_owned() };
        if codec.scale != 1.0 {
            expr = format!("({expr} * {})", lit(codec.scale));
        }
        if codec.offset != 0.0 {
            expr = format!("({expr} + ({}))", lit(codec.offset));
        }
        match &self.storage {
            StorageType::Enum(name) => format!("{name}::from_raw({expr} as i64)"),
            storage => format!("{expr} as {}", storage.rust_type()),
        }
    }
}

impl SigCodeGen<&DbcCodeGen<'_>> for Signal {
    fn gen_signal_field(&self, code: &DbcCodeGen) -> fmt::Result {
        let bounds = if self.has_bounds() {
            format!("  Min: {} Max: {}", self.min.literal, self.max.literal)
        } else {
            String::new()
        };
        code_output!(
            code,
            IDT2,
            "pub {}: {}, // {}{}   Destination: {}",
            self.get_type_snake(),
            self.storage.rust_type(),
            self.bit_range(),
            bounds,
            self.receivers.join(",")
        )
    }

    fn gen_signal_enum(&self, code: &DbcCodeGen, msg: &Message) -> fmt::Result {
        let StorageType::Enum(name) = &self.storage else {
            return Ok(());
        };

        code_output!(code, IDT1, "// DBC definition for MsgID:{} Signal:{}", msg.id.0, self.name)?;
        if code.serde {
            code_output!(code, IDT1, "#[derive(Serialize, Deserialize)]")?;
        }
        code_output!(code, IDT1, "#[derive(Copy, Clone, Debug, PartialEq, Eq)]")?;
        code_output!(code, IDT1, "pub enum {} {{", name)?;
        for variant in &self.enum_info {
            code_output!(code, IDT2, "{},", variant.get_type_kamel())?;
        }
        code_output!(code, IDT2, "_Other(i64),")?;
        code_output!(code, IDT1, "}\n")?;

        code_output!(code, IDT1, "impl {} {{", name)?;
        code_output!(code, IDT2, "pub const fn from_raw(raw: i64) -> Self {")?;
        code_output!(code, IDT3, "match raw {")?;
        for variant in &self.enum_info {
            code_output!(code, IDT4, "{} => Self::{},", variant.raw, variant.get_type_kamel())?;
        }
        code_output!(code, IDT4, "x => Self::_Other(x),")?;
        code_output!(code, IDT3, "}")?;
        code_output!(code, IDT2, "}\n")?;

        code_output!(code, IDT2, "pub const fn to_raw(self) -> i64 {")?;
        code_output!(code, IDT3, "match self {")?;
        for variant in &self.enum_info {
            code_output!(code, IDT4, "Self::{} => {},", variant.get_type_kamel(), variant.raw)?;
        }
        code_output!(code, IDT4, "Self::_Other(x) => x,")?;
        code_output!(code, IDT3, "}")?;
        code_output!(code, IDT2, "}")?;
        code_output!(code, IDT1, "}\n")?;

        code_output!(code, IDT1, "impl Default for {} {{", name)?;
        code_output!(code, IDT2, "fn default() -> Self {")?;
        code_output!(code, IDT3, "Self::from_raw(0)")?;
        code_output!(code, IDT2, "}")?;
        code_output!(code, IDT1, "}\n")
    }

    fn gen_signal_encode(&self, code: &DbcCodeGen, from: &str) -> fmt::Result {
        let codec = SignalCodec::new(self);
        let field = format!("{from}.{}", self.get_type_snake());
        let value = match self.storage {
            StorageType::Enum(_) => format!("{field}.to_raw() as f64"),
            _ => format!("f64::from({field})"),
        };

        code_output!(code, IDT2, "// {} {}", self.name, self.bit_range())?;
        match codec.clamp {
            None => code_output!(code, IDT2, "let value = {};", value)?,
            Some(clamp) => {
                code_output!(code, IDT2, "let mut value = {};", value)?;
                match clamp.min {
                    Some(min) => code_output!(
                        code,
                        IDT2,
                        "if value < {} {{ value = {}; }} // Min value: {}",
                        lit(min),
                        lit(min),
                        self.min.literal
                    )?,
                    None => code_output!(
                        code,
                        IDT2,
                        "// Not doing min value check since the signal is unsigned already"
                    )?,
                }
                code_output!(
                    code,
                    IDT2,
                    "if value > {} {{ value = {}; }} // Max value: {}",
                    lit(clamp.max),
                    lit(clamp.max),
                    self.max.literal
                )?;
            }
        }
        code_output!(
            code,
            IDT2,
            "let raw = ({} as i64 as u32) & 0x{:x};",
            Signal::encode_raw_expr(&codec),
            codec.layout.raw_mask()
        )?;

        code.gen_layout_pack(&codec.layout)
    }

    fn gen_signal_decode(&self, code: &DbcCodeGen, to: &str, indent: &str) -> fmt::Result {
        let codec = SignalCodec::new(self);
        code.gen_layout_unpack(&codec.layout, "raw", codec.signed, indent)?;

        if codec.signed {
            let sign = codec.layout.size() - 1;
            code_output!(code, indent, "if (raw & (1 << {})) != 0 {{", sign)?;
            code_output!(code, indent, "{}raw |= 0xFFFF_FFFFu32 << {};", IDT1, sign)?;
            code_output!(code, indent, "}")?;
        }

        code_output!(code, indent, "{}.{} = {};", to, self.get_type_snake(), self.decode_value_expr(&codec))
    }
}

impl MsgCodeGen<&DbcCodeGen<'_>> for Message {
    fn gen_msg_header(&self, code: &DbcCodeGen, plan: &MessagePlan) -> fmt::Result {
        let hdr = self.header();
        let comment = if plan.header.is_full() { "" } else { "// " };
        code_output!(
            code,
            IDT1,
            "{}pub const {}_HDR: DbcMsgHdr = DbcMsgHdr {{ mid: {}, dlc: {} }};",
            comment,
            self.get_type_shouty(),
            hdr.mid,
            hdr.dlc
        )
    }

    fn gen_msg_enums(&self, code: &DbcCodeGen, plan: &MessagePlan) -> fmt::Result {
        if !plan.types.is_full() || !self.contains_enums() {
            return Ok(());
        }
        code_output!(code, IDT1, "// Enumeration(s) for Message: '{}' from '{}'", self.name, self.transmitter)?;
        for signal in self.signals() {
            signal.gen_signal_enum(code, self)?;
        }
        Ok(())
    }

    fn gen_msg_struct(&self, code: &DbcCodeGen, plan: &MessagePlan) -> fmt::Result {
        if !plan.types.is_full() {
            return code_output!(
                code,
                IDT1,
                "// Not generating '{}' since we are not the sender or a recipient of any of its signals\n",
                self.get_type_kamel()
            );
        }

        let layout = MuxLayout::resolve(self);
        let derive = "#[derive(Copy, Clone, Debug, Default, PartialEq)]";

        if layout.is_muxed() {
            code_output!(code, IDT1, "// @{{ MUX'd message: {}", self.name)?;
        }

        for group in layout.groups() {
            let names = GroupNames::new(self, group);
            match group.tag() {
                None => code_output!(
                    code,
                    IDT1,
                    "/// Message: {} from '{}', DLC: {} byte(s), MID: {}",
                    self.name,
                    self.transmitter,
                    self.size,
                    self.id.0
                )?,
                Some(tag) => code_output!(code, IDT1, "/// Struct for MUX: {} (used for transmitting)", tag)?,
            }
            if code.serde {
                code_output!(code, IDT1, "#[derive(Serialize, Deserialize)]")?;
            }
            code_output!(code, IDT1, derive)?;
            code_output!(code, IDT1, "pub struct {} {{", names.kamel)?;
            for idx in &group.signals {
                let signal = &self.signals()[*idx];
                if code.scope.includes_signal(self, signal) {
                    signal.gen_signal_field(code)?;
                }
            }
            if plan.mia.is_full() {
                code_output!(code, IDT2, "pub mia_info: DbcMiaInfo,")?;
            } else {
                code_output!(code, IDT2, "// No DbcMiaInfo for a message that we will send")?;
            }
            code_output!(code, IDT1, "}\n")?;
        }

        if layout.is_muxed() {
            code_output!(code, IDT1, "/// Struct with all the child MUX'd signals (Used for receiving)")?;
            if code.serde {
                code_output!(code, IDT1, "#[derive(Serialize, Deserialize)]")?;
            }
            code_output!(code, IDT1, derive)?;
            code_output!(code, IDT1, "pub struct {} {{", self.get_type_kamel())?;
            for group in layout.groups() {
                let names = GroupNames::new(self, group);
                let tag = group.tag().unwrap_or_default();
                code_output!(code, IDT2, "pub {}: {}, // MUX'd structure", tag, names.kamel)?;
            }
            code_output!(code, IDT1, "}")?;
            code_output!(code, IDT1, "// @} MUX'd message\n")?;
        }
        Ok(())
    }

    fn gen_msg_encode(&self, code: &DbcCodeGen, plan: &MessagePlan) -> fmt::Result {
        if !plan.encode.is_full() {
            return code_output!(
                code,
                IDT1,
                "// Not generating code for dbc_encode_{}() since the sender is {} and we are {}\n",
                self.get_type_snake(),
                self.transmitter,
                code.scope.self_node()
            );
        }

        let layout = MuxLayout::resolve(self);
        let selector = layout.selector().map(|idx| SignalCodec::new(&self.signals()[idx]));

        for group in layout.groups() {
            let names = GroupNames::new(self, group);
            match group.tag() {
                None => code_output!(code, IDT1, "/// Encode {}'s '{}' message", self.transmitter, self.name)?,
                Some(tag) => code_output!(
                    code,
                    IDT1,
                    "/// Encode {}'s '{}' MUX({}) message",
                    self.transmitter,
                    self.name,
                    tag
                )?,
            }
            code_output!(code, IDT1, "/// returns the message header of this message")?;
            code_output!(
                code,
                IDT1,
                "pub fn dbc_encode_{}(bytes: &mut [u8; 8], from: &{}) -> DbcMsgHdr {{",
                names.snake,
                names.kamel
            )?;
            code_output!(code, IDT2, "*bytes = [0; 8];\n")?;

            if let (Some(selector), Some(branch)) = (&selector, group.branch) {
                code_output!(code, IDT2, "// Set the MUX index value")?;
                code_output!(code, IDT2, "let raw: u32 = {};", branch)?;
                code.gen_layout_pack(&selector.layout)?;
                code_output!(code, IDT2, "")?;
            }

            for idx in &group.signals {
                self.signals()[*idx].gen_signal_encode(code, "from")?;
            }
            code_output!(code, IDT2, "")?;
            code_output!(code, IDT2, "{}_HDR", self.get_type_shouty())?;
            code_output!(code, IDT1, "}\n")?;

            code_output!(code, IDT1, "/// Encode and send for dbc_encode_{}() message", names.snake)?;
            code_output!(
                code,
                IDT1,
                "pub fn dbc_encode_and_send_{}(from: &{}) -> bool {{",
                names.snake,
                names.kamel
            )?;
            code_output!(code, IDT2, "let mut bytes = [0u8; 8];")?;
            code_output!(code, IDT2, "let hdr = dbc_encode_{}(&mut bytes, from);", names.snake)?;
            code_output!(code, IDT2, "{}(hdr.mid, hdr.dlc, &bytes)", DBC_APP_SEND)?;
            code_output!(code, IDT1, "}\n")?;
        }
        Ok(())
    }

    fn gen_msg_decode(&self, code: &DbcCodeGen, plan: &MessagePlan) -> fmt::Result {
        if !plan.decode.is_full() {
            return code_output!(
                code,
                IDT1,
                "// Not generating code for dbc_decode_{}() since '{}' is not the recipient of any of the signals\n",
                self.get_type_snake(),
                code.scope.self_node()
            );
        }

        let layout = MuxLayout::resolve(self);
        code_output!(code, IDT1, "/// Decode {}'s '{}' message", self.transmitter, self.name)?;
        code_output!(
            code,
            IDT1,
            "/// hdr: header of the received frame to validate its DLC and MID, None skips the check"
        )?;
        code_output!(
            code,
            IDT1,
            "pub fn dbc_decode_{}(to: &mut {}, bytes: &[u8; 8], hdr: Option<&DbcMsgHdr>) -> bool {{",
            self.get_type_snake(),
            self.get_type_kamel()
        )?;
        code_output!(code, IDT2, "if let Some(hdr) = hdr {")?;
        code_output!(code, IDT3, "if *hdr != {}_HDR {{", self.get_type_shouty())?;
        code_output!(code, IDT4, "return false;")?;
        code_output!(code, IDT3, "}")?;
        code_output!(code, IDT2, "}\n")?;

        match &layout {
            MuxLayout::Plain(group) => {
                for idx in &group.signals {
                    let signal = &self.signals()[*idx];
                    if code.scope.includes_signal(self, signal) {
                        signal.gen_signal_decode(code, "to", IDT2)?;
                    }
                }
                code_output!(code, IDT2, "")?;
                code_output!(code, IDT2, "to.mia_info.mia_counter_ms = 0; // Reset the MIA counter")?;
                code_output!(code, IDT2, "to.mia_info.is_mia = false;")?;
            }
            MuxLayout::Multiplexed { selector, groups, .. } => {
                let selector = &self.signals()[*selector];
                code_output!(code, IDT2, "// Decode the MUX")?;
                code.gen_layout_unpack(&SignalCodec::new(selector).layout, "mux", false, IDT2)?;
                code_output!(code, IDT2, "")?;
                code_output!(code, IDT2, "match mux {")?;
                for group in groups {
                    let tag = group.tag().unwrap_or_default();
                    let to = format!("to.{tag}");
                    code_output!(code, IDT3, "{} => {{", group.branch.unwrap_or_default())?;
                    for idx in &group.signals {
                        let signal = &self.signals()[*idx];
                        if code.scope.includes_signal(self, signal) {
                            signal.gen_signal_decode(code, &to, IDT4)?;
                        }
                    }
                    code_output!(code, IDT4, "{}.mia_info.mia_counter_ms = 0; // Reset the MIA counter", to)?;
                    code_output!(code, IDT4, "{}.mia_info.is_mia = false;", to)?;
                    code_output!(code, IDT3, "}")?;
                }
                code_output!(code, IDT3, "_ => return false,")?;
                code_output!(code, IDT2, "}")?;
            }
        }

        code_output!(code, IDT2, "true")?;
        code_output!(code, IDT1, "}\n")
    }

    fn gen_msg_mia(&self, code: &DbcCodeGen, plan: &MessagePlan) -> fmt::Result {
        if !plan.mia.is_full() {
            return Ok(());
        }

        let layout = MuxLayout::resolve(self);
        for group in layout.groups() {
            let names = GroupNames::new(self, group);
            match group.tag() {
                None => code_output!(code, IDT1, "/// Handle the MIA for {}'s {} message", self.transmitter, self.name)?,
                Some(tag) => code_output!(
                    code,
                    IDT1,
                    "/// Handle the MIA for {}'s {} for MUX \"{}\" message",
                    self.transmitter,
                    self.name,
                    tag
                )?,
            }
            code_output!(code, IDT1, "/// time_incr_ms: time to increment the MIA counter with")?;
            code_output!(code, IDT1, "/// returns true if the MIA just occurred, then msg holds {}", names.mia_msg())?;
            code_output!(
                code,
                IDT1,
                "pub fn dbc_handle_mia_{}(msg: &mut {}, time_incr_ms: u32) -> bool {{",
                names.snake,
                names.kamel
            )?;
            code_output!(code, IDT2, "if msg.mia_info.is_mia {")?;
            code_output!(code, IDT3, "return false;")?;
            code_output!(code, IDT2, "}\n")?;
            code_output!(code, IDT2, "let counter = msg.mia_info.mia_counter_ms.saturating_add(time_incr_ms);")?;
            code_output!(code, IDT2, "if counter < {} {{", names.mia_ms())?;
            code_output!(code, IDT3, "msg.mia_info.mia_counter_ms = counter;")?;
            code_output!(code, IDT3, "return false;")?;
            code_output!(code, IDT2, "}\n")?;
            code_output!(code, IDT2, "*msg = {};", names.mia_msg())?;
            code_output!(code, IDT2, "msg.mia_info.mia_counter_ms = {};", names.mia_ms())?;
            code_output!(code, IDT2, "msg.mia_info.is_mia = true;")?;
            code_output!(code, IDT2, "true")?;
            code_output!(code, IDT1, "}\n")?;
        }
        Ok(())
    }
}

pub trait Text2Str<T> {
    /// Write a line with indentation.
    ///
    /// # Errors
    /// Propagates any formatter error.
    fn write(&self, indent: &str, text: T) -> fmt::Result;
}

impl Text2Str<&str> for DbcCodeGen<'_> {
    fn write(&self, indent: &str, text: &str) -> fmt::Result {
        let mut buffer = self.text.borrow_mut();
        writeln!(buffer, "{indent}{text}")
    }
}

impl Text2Str<String> for DbcCodeGen<'_> {
    fn write(&self, indent: &str, text: String) -> fmt::Result {
        Self::write(self, indent, text.as_str())
    }
}

impl<'a> DbcCodeGen<'a> {
    #[must_use]
    pub fn new(dbcfd: &'a DbcObject, scope: &'a EmitScope, serde: bool) -> Self {
        DbcCodeGen { dbcfd, scope, serde, text: RefCell::new(String::new()) }
    }

    fn output<T>(&self, indent: &str, text: T) -> fmt::Result
    where
        Self: Text2Str<T>,
    {
        Self::write(self, indent, text)
    }

    /// OR the low bits of the local `raw` into `bytes`, one line per byte.
    fn gen_layout_pack(&self, layout: &BitLayout) -> fmt::Result {
        let code = self;
        for step in layout.steps() {
            code_output!(
                code,
                IDT2,
                "bytes[{}] |= {}; // {} bit(s) starting from B{}",
                step.byte,
                step.pack_expr(),
                step.width,
                step.first_bit()
            )?;
        }
        Ok(())
    }

    /// Read the layout bits of `bytes` into the local `var`. It is left
    /// mutable for the sign extension when `extend` is set.
    fn gen_layout_unpack(&self, layout: &BitLayout, var: &str, extend: bool, indent: &str) -> fmt::Result {
        let code = self;
        let steps = layout.steps();
        let binding = if extend || steps.len() > 1 { "let mut" } else { "let" };

        for (idx, step) in steps.iter().enumerate() {
            if idx == 0 {
                code_output!(
                    code,
                    indent,
                    "{} {} = {}; // {} bit(s) from B{}",
                    binding,
                    var,
                    step.unpack_expr(),
                    step.width,
                    step.first_bit()
                )?;
            } else {
                code_output!(
                    code,
                    indent,
                    "{} |= {}; // {} bit(s) from B{}",
                    var,
                    step.unpack_expr(),
                    step.width,
                    step.first_bit()
                )?;
            }
        }
        Ok(())
    }

    /// Items the parent module must provide, in emission order.
    #[must_use]
    pub fn host_items(&self) -> Vec<String> {
        let mut items = Vec::new();
        let plans: Vec<(&Message, MessagePlan)> =
            self.dbcfd.messages().iter().map(|msg| (msg, self.scope.plan(msg))).collect();

        if plans.iter().any(|(_, plan)| plan.encode.is_full()) {
            items.push(DBC_APP_SEND.to_owned());
        }
        for (msg, plan) in &plans {
            if !plan.mia.is_full() {
                continue;
            }
            for group in MuxLayout::resolve(msg).groups() {
                let names = GroupNames::new(msg, group);
                items.push(names.mia_ms());
                items.push(names.mia_msg());
            }
        }
        items
    }

    fn gen_prelude(&self) -> fmt::Result {
        let code = self;
        let hosts = self.host_items();
        if !hosts.is_empty() {
            code_output!(code, IDT1, "// provided by the parent module: the frame transmit function")?;
            code_output!(code, IDT1, "// fn(mid: u32, dlc: u8, bytes: &[u8; 8]) -> bool, then for every received")?;
            code_output!(code, IDT1, "// structure its MIA threshold (u32) and MIA replacement value")?;
            code_output!(code, IDT1, "use super::{")?;
            for host in &hosts {
                code_output!(code, IDT2, "{},", host)?;
            }
            code_output!(code, IDT1, "};")?;
        }
        if self.serde {
            code_output!(code, IDT1, "use serde::{Deserialize, Serialize};")?;
        }
        code_output!(code, IDT1, "")?;

        code_output!(code, IDT1, "/// Missing in Action structure")?;
        if self.serde {
            code_output!(code, IDT1, "#[derive(Serialize, Deserialize)]")?;
        }
        code_output!(code, IDT1, "#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]")?;
        code_output!(code, IDT1, "pub struct DbcMiaInfo {")?;
        code_output!(code, IDT2, "pub is_mia: bool, // Missing in action flag")?;
        code_output!(code, IDT2, "pub mia_counter_ms: u32, // Missing in action counter")?;
        code_output!(code, IDT1, "}\n")?;
        code_output!(code, IDT1, "impl DbcMiaInfo {")?;
        code_output!(code, IDT2, "pub const fn new() -> Self {")?;
        code_output!(code, IDT3, "DbcMiaInfo { is_mia: false, mia_counter_ms: 0 }")?;
        code_output!(code, IDT2, "}")?;
        code_output!(code, IDT1, "}\n")?;

        code_output!(code, IDT1, "/// CAN message header structure")?;
        code_output!(code, IDT1, "#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]")?;
        code_output!(code, IDT1, "pub struct DbcMsgHdr {")?;
        code_output!(code, IDT2, "pub mid: u32, // Message ID of the message")?;
        code_output!(code, IDT2, "pub dlc: u8, // Data length of the message")?;
        code_output!(code, IDT1, "}\n")
    }

    /// Render the module body for every message of the model.
    ///
    /// # Errors
    /// Formatter failure.
    pub fn gen_messages(&self) -> fmt::Result {
        let code = self;
        self.gen_prelude()?;

        let plans: Vec<(&Message, MessagePlan)> =
            self.dbcfd.messages().iter().map(|msg| (msg, self.scope.plan(msg))).collect();

        for (msg, plan) in &plans {
            msg.gen_msg_header(code, plan)?;
        }
        code_output!(code, IDT1, "")?;

        for (msg, plan) in &plans {
            msg.gen_msg_enums(code, plan)?;
        }
        for (msg, plan) in &plans {
            msg.gen_msg_struct(code, plan)?;
        }
        for (msg, plan) in &plans {
            msg.gen_msg_encode(code, plan)?;
        }
        for (msg, plan) in &plans {
            msg.gen_msg_decode(code, plan)?;
        }
        for (msg, plan) in &plans {
            msg.gen_msg_mia(code, plan)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.text.into_inner()
    }
}

/// Compilation parameters, from DBC text to generated Rust module.
pub struct DbcCompiler {
    uid: &'static str,
    infile: Option<String>,
    outfile: Option<String>,
    self_node: String,
    gen_all: bool,
    serde: bool,
    header: Option<&'static str>,
    whitelist: Option<Vec<u32>>,
    blacklist: Option<Vec<u32>>,
}

impl DbcCompiler {
    #[must_use]
    pub fn new(uid: &'static str) -> Self {
        DbcCompiler {
            uid,
            infile: None,
            outfile: None,
            self_node: String::new(),
            gen_all: false,
            serde: false,
            header: None,
            whitelist: None,
            blacklist: None,
        }
    }

    pub fn dbcfile(&mut self, dbcfile: &str) -> &mut Self {
        self.infile = Some(dbcfile.to_owned());
        self
    }

    pub fn outfile(&mut self, outfile: &str) -> &mut Self {
        self.outfile = Some(outfile.to_owned());
        self
    }

    pub fn self_node(&mut self, node: &str) -> &mut Self {
        self.self_node = node.to_owned();
        self
    }

    pub fn gen_all(&mut self, flag: bool) -> &mut Self {
        self.gen_all = flag;
        self
    }

    pub fn header(&mut self, header: &'static str) -> &mut Self {
        self.header = Some(header);
        self
    }

    pub fn whitelist(&mut self, canids: Vec<u32>) -> &mut Self {
        self.whitelist = Some(canids);
        self
    }

    pub fn blacklist(&mut self, canids: Vec<u32>) -> &mut Self {
        self.blacklist = Some(canids);
        self
    }

    pub fn serde(&mut self, flag: bool) -> &mut Self {
        self.serde = flag;
        self
    }

    fn check_list(canid: MessageId, list: &[u32]) -> bool {
        list.binary_search(&canid.0).is_ok()
    }

    /// Restrict generation to the white/black listed messages. The whole
    /// document was validated before.
    fn filter(&self, dbcfd: &mut DbcObject) {
        if let Some(mut list) = self.whitelist.clone() {
            list.sort_unstable();
            dbcfd.retain_messages(|msg| DbcCompiler::check_list(msg.id, &list));
        }

        if let Some(mut list) = self.blacklist.clone() {
            list.sort_unstable();
            dbcfd.retain_messages(|msg| !DbcCompiler::check_list(msg.id, &list));
        }
    }

    fn render(&self, dbcfd: &DbcObject, source: &str) -> Result<String, DbcError> {
        let scope = EmitScope::new(&self.self_node, self.gen_all);
        let code = DbcCodeGen::new(dbcfd, &scope, self.serde);

        if let Some(header) = self.header {
            code_output!(code, IDT0, header)?;
        }

        // change Rust default to stick as much as possible on can names
        code_output!(code, IDT0, "// --------------------------------------------------------------")?;
        code_output!(code, IDT0, "//       WARNING: Manual modification will be destroyed")?;
        code_output!(code, IDT0, "// --------------------------------------------------------------")?;
        code_output!(
            code,
            IDT0,
            "// - DBC file: {}    Self node: '{}'  (ALL = {})",
            source,
            self.self_node,
            u8::from(self.gen_all)
        )?;
        code_output!(code, IDT0, "// - update only with [dbc-gen|build.rs::DbcCompiler]")?;
        code_output!(code, IDT0, "// - source code: https://github.com/redpesk-labs/canbus-rs")?;
        code_output!(code,IDT0,"// - License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$")?;
        code_output!(code, IDT0, "// -------------------------------------------------------------")?;

        code_output!(code, IDT0, "mod {} {{", self.uid)?;
        code_output!(code, IDT0, "#![allow(non_upper_case_globals)]")?;
        code_output!(code, IDT0, "#![allow(non_camel_case_types)]")?;
        code_output!(code, IDT0, "#![allow(non_snake_case)]")?;
        code_output!(code, IDT0, "#![allow(dead_code)]")?;
        code_output!(code, IDT0, "#![allow(unused_mut, unused_variables, unused_imports, unreachable_patterns)]")?;
        code_output!(code, IDT0, "#![allow(clippy::all)]")?;
        code_output!(code, IDT0, "")?;

        code.gen_messages()?;
        code_output!(code, IDT0, "}} // end {} module", self.uid)?;

        let signals: usize = dbcfd.messages().iter().map(|msg| msg.signals().len()).sum();
        log::info!(
            "dbc:{} node:{} all:{} messages:{} signals:{}",
            source,
            self.self_node,
            self.gen_all,
            dbcfd.messages().len(),
            signals
        );
        Ok(code.into_text())
    }

    /// Validate `dbc_str` and return the generated module.
    ///
    /// # Errors
    /// First invariant violation, nothing is generated in that case.
    pub fn compile_str(&self, dbc_str: &str) -> Result<String, DbcError> {
        let mut dbcfd = DbcObject::parse(dbc_str, &self.self_node)?;
        self.filter(&mut dbcfd);
        let source = self.infile.as_deref().unwrap_or("<inline>");
        self.render(&dbcfd, source)
    }

    /// Generate Rust code from the configured DBC file, to `outfile` or stdout.
    /// The output file is only created once the whole module is generated.
    ///
    /// # Errors
    /// I/O errors reading the DBC or writing output, any compilation error.
    pub fn generate(&mut self) -> Result<(), DbcError> {
        let Some(infile) = &self.infile else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "setting dbcfile is mandatory").into());
        };

        let dbc_str = fs::read_to_string(infile)?;
        let text = self.compile_str(&dbc_str)?;

        match &self.outfile {
            Some(outfile) => fs::write(outfile, text)?,
            None => io::stdout().write_all(text.as_bytes())?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DBC: &str = r#"
BU_: DRIVER MOTOR SENSOR
BO_ 100 DRIVER_HEARTBEAT: 1 DRIVER
 SG_ DRIVER_HEARTBEAT_cmd : 0|8@1+ (1,0) [0|0] "" SENSOR,MOTOR

BO_ 200 SENSOR_SONARS: 8 SENSOR
 SG_ SENSOR_SONARS_mux M : 0|4@1+ (1,0) [0|0] "" DRIVER
 SG_ SENSOR_SONARS_err_count : 4|12@1+ (1,0) [0|0] "" DRIVER
 SG_ SENSOR_SONARS_left m0 : 16|12@1+ (0.1,0) [0|0] "" DRIVER
 SG_ SENSOR_SONARS_no_filt_left m1 : 16|12@1+ (0.1,0) [0|0] "" DRIVER

BA_ "FieldType" SG_ 100 DRIVER_HEARTBEAT_cmd "DRIVER_HEARTBEAT_cmd";
VAL_ 100 DRIVER_HEARTBEAT_cmd 2 "DRIVER_HEARTBEAT_cmd_REBOOT" 1 "DRIVER_HEARTBEAT_cmd_SYNC" 0 "DRIVER_HEARTBEAT_cmd_NOOP" ;
"#;

    #[test]
    fn group_names() {
        let model = DbcObject::parse(DBC, "DRIVER").unwrap();
        let msg = &model.messages()[1];
        let layout = MuxLayout::resolve(msg);
        let names = GroupNames::new(msg, &layout.groups()[0]);
        assert_eq!(names.kamel, "SensorSonarsM0");
        assert_eq!(names.snake, "sensor_sonars_m0");
        assert_eq!(names.mia_ms(), "SENSOR_SONARS_M0__MIA_MS");
    }

    #[test]
    fn module_wraps_uid_and_attributes() {
        let text = DbcCompiler::new("dbc_demo").self_node("DRIVER").compile_str(DBC).unwrap();
        assert!(text.contains("mod dbc_demo {"));
        assert!(text.contains("#![allow(dead_code)]"));
        assert!(text.trim_end().ends_with("} // end dbc_demo module"));
    }

    #[test]
    fn host_items_follow_plan() {
        let model = DbcObject::parse(DBC, "DRIVER").unwrap();
        let scope = EmitScope::new("DRIVER", false);
        let code = DbcCodeGen::new(&model, &scope, false);
        assert_eq!(
            code.host_items(),
            [
                "dbc_app_send_can_msg",
                "SENSOR_SONARS_M0__MIA_MS",
                "SENSOR_SONARS_M0__MIA_MSG",
                "SENSOR_SONARS_M1__MIA_MS",
                "SENSOR_SONARS_M1__MIA_MSG",
            ]
        );
    }

    #[test]
    fn enum_rendering() {
        let text = DbcCompiler::new("dbc").self_node("MOTOR").compile_str(DBC).unwrap();
        assert!(text.contains("pub enum DbcDriverHeartbeatDriverHeartbeatCmd {"));
        assert!(text.contains("2 => Self::DriverHeartbeatCmdReboot,"));
        assert!(text.contains("Self::_Other(x) => x,"));
        assert!(text.contains(
            "to.driver_heartbeat_cmd = DbcDriverHeartbeatDriverHeartbeatCmd::from_raw(f64::from(raw) as i64);"
        ));
    }

    #[test]
    fn serde_derives_on_demand() {
        let text = DbcCompiler::new("dbc").self_node("DRIVER").compile_str(DBC).unwrap();
        assert!(!text.contains("Serialize"));

        let text = DbcCompiler::new("dbc").self_node("DRIVER").serde(true).compile_str(DBC).unwrap();
        assert!(text.contains("use serde::{Deserialize, Serialize};"));
        assert!(text.contains("#[derive(Serialize, Deserialize)]\n    #[derive(Copy, Clone, Debug, Default, PartialEq)]\n    pub struct DriverHeartbeat {"));
    }

    #[test]
    fn selector_uses_signal_byte_walk() {
        let text = DbcCompiler::new("dbc").self_node("SENSOR").compile_str(DBC).unwrap();
        assert!(text.contains("let raw: u32 = 1;\n        bytes[0] |= (raw as u8) & 0x0f; // 4 bit(s) starting from B0"));

        let text = DbcCompiler::new("dbc").self_node("DRIVER").compile_str(DBC).unwrap();
        assert!(text.contains("let mux = u32::from(bytes[0] & 0x0f); // 4 bit(s) from B0"));
        assert!(text.contains("let mut raw = u32::from((bytes[0] >> 4) & 0x0f); // 4 bit(s) from B4"));
        assert!(text.contains("raw |= u32::from(bytes[1]) << 4; // 8 bit(s) from B8"));
    }

    #[test]
    fn encode_lines_of_crossing_signal() {
        let text = DbcCompiler::new("dbc").self_node("SENSOR").compile_str(DBC).unwrap();
        assert!(text.contains("let raw = (value.round() as i64 as u32) & 0xfff;"));
        assert!(text.contains("bytes[0] |= ((raw as u8) & 0x0f) << 4; // 4 bit(s) starting from B4"));
        assert!(text.contains("bytes[1] |= ((raw >> 4) as u8) & 0xff; // 8 bit(s) starting from B8"));
        assert!(text.contains("let raw = ((value / 0.1).round() as i64 as u32) & 0xfff;"));
    }
}
