/*
 * Copyright (C) 2018 Marcel Buesing (MIT License)
 * Origin: https://github.com/marcelbuesing/can-dbc
 *
 * Adaptation (2022) to Redpesk and LibAfb model
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

use crate::error::DbcError;
use crate::types::StorageType;
use heck::{ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase};
use std::collections::HashMap;
use std::fs;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Highest standard (11 bit) CAN identifier.
pub const MAX_MESSAGE_ID: u32 = 2047;
/// Classic CAN payload capacity in bytes.
pub const MAX_MESSAGE_LEN: u32 = 8;

const KEYWORDS: [&str; 53] = [
    // https://doc.rust-lang.org/stable/reference/keywords.html
    "as", "break", "const", "continue", "crate", "else", "enum", "extern", "false", "fn", "for",
    "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return",
    "self", "Self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use", "where",
    "while", "async", "await", "dyn", "abstract", "become", "box", "do", "final", "macro",
    "override", "priv", "typeof", "unsized", "virtual", "yield", "try", "union",
    // Internal names
    "_other",
];

fn escape_ident(name: &str) -> String {
    if KEYWORDS.contains(&name.to_lowercase().as_str())
        || !name.starts_with(|c: char| c.is_ascii_alphabetic())
    {
        format!("X{name}")
    } else {
        name.to_owned()
    }
}

/// UpperCamelCase identifier, `X` prefixed when it would clash with a keyword.
pub fn to_kamel(name: &str) -> String {
    escape_ident(name).to_upper_camel_case()
}

/// snake_case identifier, `X` prefixed when it would clash with a keyword.
pub fn to_snake(name: &str) -> String {
    escape_ident(name).to_snake_case()
}

pub fn to_shouty(name: &str) -> String {
    escape_ident(name).to_shouty_snake_case()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MessageId(pub u32);

impl MessageId {
    #[must_use]
    pub fn to_u32(self) -> u32 {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ValueType {
    Signed,
    Unsigned,
}

/// Role of a signal within a multiplexed message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum MuxRole {
    Plain,
    Selector,
    Branch(u32),
}

/// Numeric literal kept with its source text: the literal form decides
/// between integer and floating point storage.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DbcNumber {
    pub literal: String,
    pub value: f64,
}

impl DbcNumber {
    #[must_use]
    pub fn new(literal: &str, value: f64) -> Self {
        DbcNumber { literal: literal.to_owned(), value }
    }

    /// True when the literal is written as a whole number (no decimal point
    /// and no fractional part once exponent is applied).
    #[must_use]
    pub fn is_integral(&self) -> bool {
        !self.literal.contains('.') && self.value.fract() == 0.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.value == 0.0
    }
}

/// One entry of a `VAL_` table: raw value and its symbolic label.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ValDescription {
    pub raw: i64,
    pub label: String,
}

impl ValDescription {
    pub fn get_type_kamel(&self) -> String {
        to_kamel(&self.label)
    }
}

/// CAN message header, as handed to the transmit primitive and checked on decode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MsgHdr {
    pub mid: u32,
    pub dlc: u8,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Signal {
    pub name: String,
    pub bit_start: u32,
    pub bit_size: u32,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    pub scale: DbcNumber,
    pub offset: DbcNumber,
    pub min: DbcNumber,
    pub max: DbcNumber,
    pub unit: String,
    pub receivers: Vec<String>,
    pub mux: MuxRole,
    /// Set by a `BA_ "FieldType"` record, gates `VAL_` tables.
    pub field_type: bool,
    pub enum_info: Vec<ValDescription>,
    pub storage: StorageType,
}

impl Signal {
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.value_type == ValueType::Signed
    }

    #[must_use]
    pub fn is_enum(&self) -> bool {
        !self.enum_info.is_empty()
    }

    #[must_use]
    pub fn is_muxed(&self) -> bool {
        self.mux != MuxRole::Plain
    }

    /// min/max of 0/0 means the range is not checked
    #[must_use]
    pub fn has_bounds(&self) -> bool {
        !self.min.is_zero() || !self.max.is_zero()
    }

    /// First bit after the signal.
    #[must_use]
    pub fn bit_end(&self) -> u32 {
        self.bit_start + self.bit_size
    }

    #[must_use]
    pub fn overlaps(&self, other: &Signal) -> bool {
        self.bit_start < other.bit_end() && other.bit_start < self.bit_end()
    }

    #[must_use]
    pub fn is_receiver(&self, node: &str) -> bool {
        self.receivers.iter().any(|receiver| receiver == node)
    }

    pub fn get_type_kamel(&self) -> String {
        to_kamel(&self.name)
    }

    pub fn get_type_snake(&self) -> String {
        to_snake(&self.name)
    }
}

/// Message with its signals kept in declaration order.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Message {
    pub id: MessageId,
    pub name: String,
    pub size: u32,
    pub transmitter: String,
    signals: Vec<Signal>,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: HashMap<String, usize>,
}

impl Message {
    #[must_use]
    pub fn new(id: MessageId, name: &str, size: u32, transmitter: &str) -> Self {
        Message {
            id,
            name: name.to_owned(),
            size,
            transmitter: transmitter.to_owned(),
            signals: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Append a signal, refusing a name already present in this message.
    pub(crate) fn add_signal(&mut self, signal: Signal) -> bool {
        if self.index.contains_key(&signal.name) {
            return false;
        }
        self.index.insert(signal.name.clone(), self.signals.len());
        self.signals.push(signal);
        true
    }

    #[must_use]
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub(crate) fn signals_mut(&mut self) -> &mut [Signal] {
        &mut self.signals
    }

    #[must_use]
    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.index.get(name).map(|idx| &self.signals[*idx])
    }

    pub(crate) fn signal_mut(&mut self, name: &str) -> Option<&mut Signal> {
        match self.index.get(name) {
            Some(idx) => self.signals.get_mut(*idx),
            None => None,
        }
    }

    /// True when `node` receives at least one signal of this message.
    #[must_use]
    pub fn is_recipient(&self, node: &str) -> bool {
        self.signals.iter().any(|signal| signal.is_receiver(node))
    }

    #[must_use]
    pub fn is_muxed(&self) -> bool {
        self.signals.iter().any(Signal::is_muxed)
    }

    #[must_use]
    pub fn contains_enums(&self) -> bool {
        self.signals.iter().any(Signal::is_enum)
    }

    #[must_use]
    pub fn selector(&self) -> Option<&Signal> {
        self.signals.iter().find(|signal| signal.mux == MuxRole::Selector)
    }

    #[must_use]
    pub fn header(&self) -> MsgHdr {
        // size is bounded to MAX_MESSAGE_LEN at parse time
        MsgHdr { mid: self.id.0, dlc: self.size.min(MAX_MESSAGE_LEN) as u8 }
    }

    pub fn get_type_kamel(&self) -> String {
        to_kamel(&self.name)
    }

    pub fn get_type_snake(&self) -> String {
        to_snake(&self.name)
    }

    pub fn get_type_shouty(&self) -> String {
        to_shouty(&self.name)
    }
}

/// Validated in-memory view of a DBC document. Built once by the parser and
/// never mutated by the generators.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DbcObject {
    pub nodes: Vec<String>,
    messages: Vec<Message>,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: HashMap<u32, usize>,
}

impl DbcObject {
    /// Parse and validate a DBC document for `self_node`.
    ///
    /// # Errors
    /// First violated invariant of the document.
    pub fn parse(dbc_str: &str, self_node: &str) -> Result<DbcObject, DbcError> {
        crate::parser::dbc_from_str(dbc_str, self_node)
    }

    /// # Errors
    /// I/O error reading `path`, then any [`DbcObject::parse`] error.
    pub fn from_file(path: &str, self_node: &str) -> Result<DbcObject, DbcError> {
        let dbc_str = fs::read_to_string(path)?;
        Self::parse(&dbc_str, self_node)
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.index.get(&id.0).map(|idx| &self.messages[*idx])
    }

    pub(crate) fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        match self.index.get(&id.0) {
            Some(idx) => self.messages.get_mut(*idx),
            None => None,
        }
    }

    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.index.contains_key(&id.0)
    }

    pub(crate) fn push_message(&mut self, message: Message) -> bool {
        if self.contains(message.id) {
            return false;
        }
        self.index.insert(message.id.0, self.messages.len());
        self.messages.push(message);
        true
    }

    pub(crate) fn messages_mut(&mut self) -> &mut [Message] {
        &mut self.messages
    }

    /// Keep only messages matching `keep`, preserving declaration order.
    pub fn retain_messages<F>(&mut self, keep: F)
    where
        F: FnMut(&Message) -> bool,
    {
        self.messages.retain(keep);
        self.index =
            self.messages.iter().enumerate().map(|(idx, msg)| (msg.id.0, idx)).collect();
    }

    /// Pretty JSON dump of the validated model.
    ///
    /// # Errors
    /// Serialization failure reported as I/O error.
    #[cfg(feature = "serde_json")]
    pub fn to_json(&self) -> Result<String, DbcError> {
        Ok(serde_json::to_string_pretty(self).map_err(std::io::Error::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_escape_keywords() {
        assert_eq!(to_kamel("DRIVER_HEARTBEAT"), "DriverHeartbeat");
        assert_eq!(to_snake("DRIVER_HEARTBEAT_cmd"), "driver_heartbeat_cmd");
        assert_eq!(to_snake("type"), "xtype");
        assert!(to_kamel("2ND_GEAR").starts_with('X'));
        assert_eq!(to_shouty("Motor_Status"), "MOTOR_STATUS");
    }

    #[test]
    fn literal_form_decides_integral() {
        assert!(DbcNumber::new("1", 1.0).is_integral());
        assert!(!DbcNumber::new("1.0", 1.0).is_integral());
        assert!(!DbcNumber::new("1e-3", 0.001).is_integral());
        assert!(DbcNumber::new("1e2", 100.0).is_integral());
    }

    #[test]
    fn message_keeps_insertion_order() {
        let mut msg = Message::new(MessageId(10), "M", 8, "A");
        for name in ["zeta", "alpha", "mid"] {
            let signal = Signal {
                name: name.to_owned(),
                bit_start: 0,
                bit_size: 1,
                byte_order: ByteOrder::LittleEndian,
                value_type: ValueType::Unsigned,
                scale: DbcNumber::new("1", 1.0),
                offset: DbcNumber::new("0", 0.0),
                min: DbcNumber::new("0", 0.0),
                max: DbcNumber::new("0", 0.0),
                unit: String::new(),
                receivers: vec!["B".to_owned()],
                mux: MuxRole::Plain,
                field_type: false,
                enum_info: Vec::new(),
                storage: StorageType::default(),
            };
            assert!(msg.add_signal(signal));
        }
        let names: Vec<&str> = msg.signals().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(msg.signal("alpha").map(|s| s.name.as_str()), Some("alpha"));
        assert!(msg.is_recipient("B"));
        assert!(!msg.is_recipient("A"));
    }
}
