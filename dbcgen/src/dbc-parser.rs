/*
 * Copyright (C) 2018 Marcel Buesing (MIT License)
 * Origin: https://github.com/marcelbuesing/can-dbc
 *
 * Adaptation (2022) to Redpesk and LibAfb model
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
 * Line oriented reader: only BU_, BO_, SG_, BA_ "FieldType" and VAL_ records
 * are interpreted, every other line (version, comments, attributes
 * definitions, ...) is skipped.
 */

use crate::data::*;
use crate::error::DbcError;
use crate::mux::{GroupNames, MuxLayout, MuxTracker};
use crate::types::{resolve_storage, StorageType};

use std::collections::HashMap;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{self, char},
    combinator::{all_consuming, consumed, map, opt, value},
    error::{ErrorKind, ParseError},
    multi::{many_till, separated_list0, separated_list1},
    number::complete::double,
    sequence::{delimited, preceded, tuple},
    AsChar, IResult, InputTakeAtPosition,
};

fn is_c_string_char(chr: char) -> bool {
    chr.is_ascii_digit() || chr.is_alphabetic() || chr == '_'
}

fn is_c_ident_head(chr: char) -> bool {
    chr.is_alphabetic() || chr == '_'
}

fn is_quote(chr: char) -> bool {
    chr == '"'
}

fn is_blank(chr: char) -> bool {
    chr == ' ' || chr == '\t'
}

/// Multispace zero or more
fn ms0<T, E: ParseError<T>>(input: T) -> IResult<T, T, E>
where
    T: InputTakeAtPosition,
    <T as InputTakeAtPosition>::Item: AsChar + Clone,
{
    input.split_at_position_complete(|item| !is_blank(item.as_char()))
}

/// Multi space one or more
fn ms1<T, E: ParseError<T>>(input: T) -> IResult<T, T, E>
where
    T: InputTakeAtPosition,
    <T as InputTakeAtPosition>::Item: AsChar + Clone,
{
    input.split_at_position1_complete(|item| !is_blank(item.as_char()), ErrorKind::MultiSpace)
}

/// Colon aka `:`
fn colon(s: &str) -> IResult<&str, char> {
    char(':')(s)
}

/// Comma aka ','
fn comma(s: &str) -> IResult<&str, char> {
    char(',')(s)
}

/// Comma aka ';'
fn semi_colon(s: &str) -> IResult<&str, char> {
    char(';')(s)
}

/// Quote aka '"'
fn quote(s: &str) -> IResult<&str, char> {
    char('"')(s)
}

/// Pipe character
fn pipe(s: &str) -> IResult<&str, char> {
    char('|')(s)
}

/// at character
fn at(s: &str) -> IResult<&str, char> {
    char('@')(s)
}

/// brace open aka '('
fn brc_open(s: &str) -> IResult<&str, char> {
    char('(')(s)
}

/// brace close aka ')'
fn brc_close(s: &str) -> IResult<&str, char> {
    char(')')(s)
}

/// bracket open aka '['
fn brk_open(s: &str) -> IResult<&str, char> {
    char('[')(s)
}

/// bracket close aka ']'
fn brk_close(s: &str) -> IResult<&str, char> {
    char(']')(s)
}

/// A valid C_identifier. C_identifiers start with a  alphacharacter or an underscore
/// and may further consist of alpha­numeric, characters and underscore
fn c_ident(s: &str) -> IResult<&str, String> {
    let (s, head) = take_while1(is_c_ident_head)(s)?;
    let (s, remaining) = take_while(is_c_string_char)(s)?;
    Ok((s, [head, remaining].concat()))
}

fn c_ident_vec(s: &str) -> IResult<&str, Vec<String>> {
    separated_list1(delimited(ms0, comma, ms0), c_ident)(s)
}

fn char_string(s: &str) -> IResult<&str, &str> {
    let (s, _) = quote(s)?;
    let (s, char_string_value) = take_till(is_quote)(s)?;
    let (s, _) = quote(s)?;
    Ok((s, char_string_value))
}

/// Decimal literal, kept with its source text.
fn number(s: &str) -> IResult<&str, DbcNumber> {
    map(consumed(double), |(literal, value)| DbcNumber::new(literal, value))(s)
}

fn little_endian(s: &str) -> IResult<&str, ByteOrder> {
    map(char('1'), |_| ByteOrder::LittleEndian)(s)
}

fn big_endian(s: &str) -> IResult<&str, ByteOrder> {
    map(char('0'), |_| ByteOrder::BigEndian)(s)
}

fn byte_order(s: &str) -> IResult<&str, ByteOrder> {
    alt((little_endian, big_endian))(s)
}

fn signed(s: &str) -> IResult<&str, ValueType> {
    map(char('-'), |_| ValueType::Signed)(s)
}

fn unsigned(s: &str) -> IResult<&str, ValueType> {
    map(char('+'), |_| ValueType::Unsigned)(s)
}

fn value_type(s: &str) -> IResult<&str, ValueType> {
    alt((signed, unsigned))(s)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MultiplexIndicator {
    /// Multiplexor switch
    Multiplexor,
    /// Signal us being multiplexed by the multiplexer switch.
    MultiplexedSignal(u64),
    /// Signal us being multiplexed by the multiplexer switch and itself is a multiplexor
    MultiplexorAndMultiplexedSignal(u64),
    /// Normal signal
    Plain,
}

fn multiplexer(s: &str) -> IResult<&str, MultiplexIndicator> {
    let (s, _) = ms1(s)?;
    let (s, _) = char('m')(s)?;
    let (s, d) = complete::u64(s)?;
    let (s, _) = ms1(s)?;
    Ok((s, MultiplexIndicator::MultiplexedSignal(d)))
}

fn multiplexor(s: &str) -> IResult<&str, MultiplexIndicator> {
    let (s, _) = ms1(s)?;
    let (s, _) = char('M')(s)?;
    let (s, _) = ms1(s)?;
    Ok((s, MultiplexIndicator::Multiplexor))
}

fn multiplexor_and_multiplexed(s: &str) -> IResult<&str, MultiplexIndicator> {
    let (s, _) = ms1(s)?;
    let (s, _) = char('m')(s)?;
    let (s, d) = complete::u64(s)?;
    let (s, _) = char('M')(s)?;
    let (s, _) = ms1(s)?;
    Ok((s, MultiplexIndicator::MultiplexorAndMultiplexedSignal(d)))
}

fn plain(s: &str) -> IResult<&str, MultiplexIndicator> {
    let (s, _) = ms0(s)?;
    Ok((s, MultiplexIndicator::Plain))
}

fn multiplexer_indicator(s: &str) -> IResult<&str, MultiplexIndicator> {
    alt((multiplexer, multiplexor, multiplexor_and_multiplexed, plain))(s)
}

/// Raw `SG_` record, bounds are checked by [`DbcBuilder::parse_signal`].
#[derive(Clone, Debug, PartialEq)]
struct SignalRecord {
    name: String,
    mux: MultiplexIndicator,
    start: i64,
    size: i64,
    byte_order: ByteOrder,
    value_type: ValueType,
    scale: DbcNumber,
    offset: DbcNumber,
    min: DbcNumber,
    max: DbcNumber,
    unit: String,
    receivers: Vec<String>,
}

/// `BO_ <id> <name>: <length> <sender>`
#[derive(Clone, Debug, PartialEq, Eq)]
struct HeaderRecord {
    id: i64,
    name: String,
    size: i64,
    transmitter: String,
}

fn node_list(s: &str) -> IResult<&str, Vec<String>> {
    let (s, _) = tag("BU_")(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = colon(s)?;
    let (s, _) = ms0(s)?;
    let (s, nodes) = separated_list0(ms1, c_ident)(s)?;
    let (s, _) = ms0(s)?;
    Ok((s, nodes))
}

fn message_header(s: &str) -> IResult<&str, HeaderRecord> {
    let (s, _) = tag("BO_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, id) = complete::i64(s)?;
    let (s, _) = ms1(s)?;
    let (s, name) = c_ident(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = colon(s)?;
    let (s, _) = ms0(s)?;
    let (s, size) = complete::i64(s)?;
    let (s, _) = ms1(s)?;
    let (s, transmitter) = c_ident(s)?;
    let (s, _) = ms0(s)?;
    Ok((s, HeaderRecord { id, name, size, transmitter }))
}

fn signal(s: &str) -> IResult<&str, SignalRecord> {
    let (s, _) = tag("SG_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, name) = c_ident(s)?;
    let (s, mux) = multiplexer_indicator(s)?;
    let (s, _) = colon(s)?;
    let (s, _) = ms0(s)?;
    let (s, start) = complete::i64(s)?;
    let (s, _) = pipe(s)?;
    let (s, size) = complete::i64(s)?;
    let (s, _) = at(s)?;
    let (s, byte_order) = byte_order(s)?;
    let (s, value_type) = value_type(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = brc_open(s)?;
    let (s, scale) = number(s)?;
    let (s, _) = comma(s)?;
    let (s, offset) = number(s)?;
    let (s, _) = brc_close(s)?;
    let (s, _) = ms0(s)?;
    let (s, _) = brk_open(s)?;
    let (s, min) = number(s)?;
    let (s, _) = pipe(s)?;
    let (s, max) = number(s)?;
    let (s, _) = brk_close(s)?;
    let (s, _) = ms0(s)?;
    let (s, unit) = char_string(s)?;
    let (s, _) = ms0(s)?;
    let (s, receivers) = c_ident_vec(s)?;
    let (s, _) = ms0(s)?;
    Ok((
        s,
        SignalRecord {
            name,
            mux,
            start,
            size,
            byte_order,
            value_type,
            scale,
            offset,
            min,
            max,
            unit: unit.to_string(),
            receivers,
        },
    ))
}

fn signal_ref(s: &str) -> IResult<&str, (i64, String)> {
    let (s, _) = tag("SG_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, message_id) = complete::i64(s)?;
    let (s, _) = ms1(s)?;
    let (s, signal_name) = c_ident(s)?;
    Ok((s, (message_id, signal_name)))
}

/// `BA_ "FieldType" SG_ <id> <name> ...;` anything after the signal name is
/// ignored. Returns `None` when the attribute targets another object kind.
fn field_type(s: &str) -> IResult<&str, Option<(i64, String)>> {
    let (s, _) = tag("BA_")(s)?;
    let (s, _) = ms1(s)?;
    let (s, _) = tag("\"FieldType\"")(s)?;
    let (s, _) = ms0(s)?;
    opt(signal_ref)(s)
}

#[allow(clippy::cast_possible_truncation)]
fn value_description(s: &str) -> IResult<&str, ValDescription> {
    let (s, a) = double(s)?;
    let (s, _) = ms1(s)?;
    let (s, b) = char_string(s)?;
    Ok((s, ValDescription { raw: a as i64, label: b.to_string() }))
}

fn value_descriptions(s: &str) -> IResult<&str, Vec<ValDescription>> {
    let (s, (values, _)) =
        many_till(preceded(ms1, value_description), preceded(ms0, semi_colon))(s)?;
    let (s, _) = ms0(s)?;
    Ok((s, values))
}

fn value_description_for_signal(s: &str) -> IResult<&str, (i64, String, Vec<ValDescription>)> {
    let (s, message_id) = complete::i64(s)?;
    let (s, _) = ms1(s)?;
    let (s, signal_name) = c_ident(s)?;
    let (s, values) = value_descriptions(s)?;
    Ok((s, (message_id, signal_name, values)))
}

fn value_description_for_env_var(s: &str) -> IResult<&str, ()> {
    value((), tuple((c_ident, value_descriptions)))(s)
}

/// `VAL_` record, `None` for environment variable tables.
fn enum_table(s: &str) -> IResult<&str, Option<(i64, String, Vec<ValDescription>)>> {
    let (s, _) = tag("VAL_")(s)?;
    let (s, _) = ms1(s)?;
    alt((map(value_description_for_signal, Some), value(None, value_description_for_env_var)))(s)
}

fn record<T>(line: usize, kind: &str, result: IResult<&str, T>) -> Result<T, DbcError> {
    match result {
        Ok((_, value)) => Ok(value),
        Err(error) => Err(DbcError::Parsing { line, info: format!("invalid {kind} record ({error})") }),
    }
}

fn check_number(name: &str, what: &str, number: &DbcNumber) -> Result<(), DbcError> {
    if number.value.is_finite() {
        Ok(())
    } else {
        Err(DbcError::validation(
            "signal-number-invalid",
            name,
            format!("{what} {} is not a finite number", number.literal),
        ))
    }
}

/// Declared min/max must sit inside the physical range reachable by the
/// raw value (bounds of 0 are not checked).
#[allow(clippy::cast_possible_wrap)]
fn check_range(signal: &Signal) -> Result<(), DbcError> {
    let size = signal.bit_size as i32;
    let (raw_min, raw_max) = if signal.is_signed() {
        (-(2f64.powi(size - 1)), 2f64.powi(size - 1) - 1.0)
    } else {
        (0.0, 2f64.powi(size) - 1.0)
    };

    let scale = signal.scale.value;
    let offset = signal.offset.value;
    let first = raw_min * scale + offset;
    let last = raw_max * scale + offset;
    let (lowest, highest) = if first <= last { (first, last) } else { (last, first) };
    let epsilon = scale.abs() * 1e-6;

    if !signal.min.is_zero() && signal.min.value < lowest - epsilon {
        return Err(DbcError::validation(
            "signal-min-too-low",
            &signal.name,
            format!("min value {} too low, lowest value is {lowest}", signal.min.literal),
        ));
    }

    if !signal.max.is_zero() && signal.max.value > highest + epsilon {
        return Err(DbcError::validation(
            "signal-max-too-high",
            &signal.name,
            format!("max value {} too high, highest value is {highest}", signal.max.literal),
        ));
    }
    Ok(())
}

/// Items the generated module always defines, and the per structure field
/// added next to the signals.
const RESERVED_TYPES: [&str; 2] = ["DbcMiaInfo", "DbcMsgHdr"];
const RESERVED_FIELD: &str = "mia_info";

/// Parse state of one compilation run.
pub(crate) struct DbcBuilder<'a> {
    self_node: &'a str,
    nodes: Option<Vec<String>>,
    dbc: DbcObject,
    current: Option<MessageId>,
    mux: MuxTracker,
    /// generated identifier -> DBC record owning it
    idents: HashMap<String, String>,
}

impl<'a> DbcBuilder<'a> {
    pub fn new(self_node: &'a str) -> Self {
        DbcBuilder {
            self_node,
            nodes: None,
            dbc: DbcObject::default(),
            current: None,
            mux: MuxTracker::default(),
            idents: RESERVED_TYPES.iter().map(|name| ((*name).to_owned(), "<builtin>".to_owned())).collect(),
        }
    }

    /// Dispatch one document line to its record handler.
    pub fn parse_line(&mut self, line: usize, text: &str) -> Result<(), DbcError> {
        let text = text.trim();

        if text.starts_with("BU_:") || text.starts_with("BU_ :") {
            let nodes = record(line, "BU_", all_consuming(node_list)(text))?;
            self.parse_nodes(nodes)
        } else if text.starts_with("BO_ ") {
            let header = record(line, "BO_", all_consuming(message_header)(text))?;
            self.parse_message_header(header)
        } else if text.starts_with("SG_ ") {
            let signal = record(line, "SG_", all_consuming(signal)(text))?;
            self.parse_signal(signal)
        } else if text.starts_with("BA_ \"FieldType\"") {
            if let Some((id, name)) = record(line, "BA_", field_type(text))? {
                self.parse_enum_flag(id, &name);
            }
            Ok(())
        } else if text.starts_with("VAL_ ") {
            if let Some((id, name, values)) = record(line, "VAL_", all_consuming(enum_table)(text))? {
                self.parse_enum_table(id, &name, values);
            }
            Ok(())
        } else {
            Ok(())
        }
    }

    pub fn parse_nodes(&mut self, nodes: Vec<String>) -> Result<(), DbcError> {
        if !nodes.iter().any(|node| node == self.self_node) {
            return Err(DbcError::Configuration { node: self.self_node.to_owned() });
        }
        log::debug!("nodes: {}", nodes.join(","));
        self.nodes = Some(nodes);
        Ok(())
    }

    /// Claim a generated identifier for `owner`. Two DBC records must never
    /// fold onto the same Rust item, the previous owner is returned on clash.
    fn claim_ident(&mut self, ident: &str, owner: &str) -> Option<String> {
        match self.idents.get(ident) {
            Some(other) if other != owner => Some(other.clone()),
            Some(_) => None,
            None => {
                self.idents.insert(ident.to_owned(), owner.to_owned());
                None
            }
        }
    }

    /// Multiplexed message must provide at least one branch. Struct, routine
    /// and constant names of the message and its branches are claimed once
    /// all its signals are known.
    fn close_message(&mut self) -> Result<(), DbcError> {
        if self.mux.has_selector() && !self.mux.has_branch() {
            let selector = self.mux.selector_name().unwrap_or_default().to_owned();
            return Err(DbcError::validation(
                "mux-branch-missing",
                selector,
                "multiplexor without any m<index> signal".to_owned(),
            ));
        }

        let Some(message) = self.current.and_then(|id| self.dbc.message(id)) else {
            return Ok(());
        };
        let owner = format!("{} (id:{})", message.name, message.id.0);
        let mut idents = vec![message.get_type_kamel(), message.get_type_snake(), message.get_type_shouty()];
        for group in MuxLayout::resolve(message).groups() {
            let names = GroupNames::new(message, group);
            idents.extend([names.kamel, names.snake, names.shouty]);
        }
        idents.sort_unstable();
        idents.dedup();
        for ident in idents {
            if let Some(other) = self.claim_ident(&ident, &owner) {
                return Err(DbcError::structural(
                    "msg-name-collision",
                    owner,
                    format!("generated name {ident} already used by {other}"),
                ));
            }
        }
        Ok(())
    }

    fn parse_message_header(&mut self, header: HeaderRecord) -> Result<(), DbcError> {
        self.close_message()?;

        if header.id < 0 || header.id > i64::from(MAX_MESSAGE_ID) {
            return Err(DbcError::structural(
                "msg-id-out-of-range",
                &header.name,
                format!("msg id {} is out of bounds for 11-bit id [0..{MAX_MESSAGE_ID}]", header.id),
            ));
        }

        if header.size < 0 || header.size > i64::from(MAX_MESSAGE_LEN) {
            return Err(DbcError::structural(
                "msg-len-out-of-range",
                &header.name,
                format!(
                    "msg id {} has {} bytes, it must be between 0 and {MAX_MESSAGE_LEN} bytes",
                    header.id, header.size
                ),
            ));
        }

        // bounded above
        let id = MessageId(header.id as u32);
        let message = Message::new(id, &header.name, header.size as u32, &header.transmitter);
        if !self.dbc.push_message(message) {
            return Err(DbcError::structural(
                "msg-id-duplicate",
                &header.name,
                format!("msg id {} has already been used", header.id),
            ));
        }

        log::debug!("message: {} id:{} len:{} sender:{}", header.name, header.id, header.size, header.transmitter);
        self.current = Some(id);
        self.mux = MuxTracker::default();
        Ok(())
    }

    fn parse_signal(&mut self, sig: SignalRecord) -> Result<(), DbcError> {
        let Some(id) = self.current else {
            return Err(DbcError::structural(
                "signal-outside-message",
                &sig.name,
                "SG_ record before any BO_ message".to_owned(),
            ));
        };
        let Some(message) = self.dbc.message_mut(id) else {
            return Err(DbcError::structural("signal-outside-message", &sig.name, format!("no message id:{}", id.0)));
        };

        if sig.size <= 0 {
            return Err(DbcError::validation(
                "signal-size-invalid",
                &sig.name,
                format!("has invalid size, signal bit width is: {}", sig.size),
            ));
        }

        if sig.start < 0 {
            return Err(DbcError::validation(
                "signal-start-invalid",
                &sig.name,
                format!("has invalid start bit: {}", sig.start),
            ));
        }

        if sig.size > 32 {
            return Err(DbcError::validation(
                "signal-size-too-large",
                &sig.name,
                format!("bit width {} exceeds the 32 bits raw value", sig.size),
            ));
        }

        let frame_bits = i64::from(message.size) * 8;
        if sig.start + sig.size > frame_bits {
            return Err(DbcError::validation(
                "signal-too-large",
                &sig.name,
                format!(
                    "too large, message {} needs {} bits but only has {frame_bits}",
                    message.name,
                    sig.start + sig.size
                ),
            ));
        }

        if sig.byte_order == ByteOrder::BigEndian {
            return Err(DbcError::validation(
                "signal-big-endian",
                &sig.name,
                "big endian (@0) layout is not supported".to_owned(),
            ));
        }

        let mux = match sig.mux {
            MultiplexIndicator::Plain => MuxRole::Plain,
            MultiplexIndicator::Multiplexor => MuxRole::Selector,
            MultiplexIndicator::MultiplexedSignal(index) => match u32::try_from(index) {
                Ok(index) => MuxRole::Branch(index),
                Err(_) => {
                    return Err(DbcError::validation(
                        "mux-index-out-of-range",
                        &sig.name,
                        format!("mux index m{index} out of bounds"),
                    ))
                }
            },
            MultiplexIndicator::MultiplexorAndMultiplexedSignal(index) => {
                return Err(DbcError::validation(
                    "mux-extended-unsupported",
                    &sig.name,
                    format!("extended multiplexing m{index}M is not supported"),
                ));
            }
        };

        check_number(&sig.name, "scale", &sig.scale)?;
        check_number(&sig.name, "offset", &sig.offset)?;
        check_number(&sig.name, "min", &sig.min)?;
        check_number(&sig.name, "max", &sig.max)?;
        if sig.scale.is_zero() {
            return Err(DbcError::validation("signal-scale-invalid", &sig.name, "scale must not be 0".to_owned()));
        }

        // start/size bounded by frame size
        let signal = Signal {
            name: sig.name,
            bit_start: sig.start as u32,
            bit_size: sig.size as u32,
            byte_order: sig.byte_order,
            value_type: sig.value_type,
            scale: sig.scale,
            offset: sig.offset,
            min: sig.min,
            max: sig.max,
            unit: sig.unit,
            receivers: sig.receivers,
            mux,
            field_type: false,
            enum_info: Vec::new(),
            storage: StorageType::default(),
        };

        self.mux.check_mux(&signal)?;
        self.mux.check_overlap(&signal)?;
        check_range(&signal)?;

        let field = signal.get_type_snake();
        if field == RESERVED_FIELD {
            return Err(DbcError::validation(
                "signal-name-reserved",
                &signal.name,
                format!("generated field {field} is reserved for the MIA state"),
            ));
        }
        let clash = message.signals().iter().find(|other| other.name != signal.name && other.get_type_snake() == field);
        if let Some(other) = clash {
            return Err(DbcError::validation(
                "signal-name-collision",
                &signal.name,
                format!("generated field {field} already used by {} in message {}", other.name, message.name),
            ));
        }

        self.mux.accept(&signal);
        log::debug!(
            "signal: {}::{} [{}..{}) {:?}",
            message.name,
            signal.name,
            signal.bit_start,
            signal.bit_end(),
            signal.mux
        );
        let name = signal.name.clone();
        if !message.add_signal(signal) {
            return Err(DbcError::validation(
                "signal-name-duplicate",
                name,
                format!("already defined in message {}", message.name),
            ));
        }
        Ok(())
    }

    /// Unknown message or signal references are ignored.
    fn signal_mut(&mut self, id: i64, name: &str) -> Option<&mut Signal> {
        let id = MessageId(u32::try_from(id).ok()?);
        self.dbc.message_mut(id)?.signal_mut(name)
    }

    fn parse_enum_flag(&mut self, id: i64, name: &str) {
        if let Some(signal) = self.signal_mut(id, name) {
            log::debug!("field type: {id}::{name}");
            signal.field_type = true;
        }
    }

    fn parse_enum_table(&mut self, id: i64, name: &str, values: Vec<ValDescription>) {
        let Some(signal) = self.signal_mut(id, name) else {
            return;
        };
        if !signal.field_type {
            log::debug!("value table {id}::{name} ignored, no FieldType attribute");
            return;
        }

        let mut enum_info: Vec<ValDescription> = Vec::new();
        for entry in values {
            if enum_info.iter().any(|known| known.get_type_kamel() == entry.get_type_kamel()) {
                log::warn!("value table {id}::{name} duplicated label {} ignored", entry.label);
                continue;
            }
            enum_info.push(entry);
        }
        signal.enum_info = enum_info;
    }

    /// Close the document: node list is mandatory, storage types are resolved
    /// once every enumeration table is known.
    pub fn finish(mut self) -> Result<DbcObject, DbcError> {
        self.close_message()?;

        let Some(nodes) = self.nodes.take() else {
            return Err(DbcError::Configuration { node: self.self_node.to_owned() });
        };
        self.dbc.nodes = nodes;

        for message in self.dbc.messages_mut() {
            let msg_name = message.name.clone();
            for signal in message.signals_mut() {
                let storage = resolve_storage(&msg_name, signal);
                if storage == StorageType::Float && signal.is_enum() {
                    log::warn!("signal {msg_name}::{} has decimal scale, value table ignored", signal.name);
                    signal.enum_info.clear();
                }
                signal.storage = storage;
            }
        }

        let mut enums = Vec::new();
        for message in self.dbc.messages() {
            for signal in message.signals() {
                if let StorageType::Enum(name) = &signal.storage {
                    enums.push((name.clone(), format!("{}::{}", message.name, signal.name)));
                }
            }
        }
        for (name, owner) in enums {
            if let Some(other) = self.claim_ident(&name, &owner) {
                return Err(DbcError::validation(
                    "signal-name-collision",
                    owner,
                    format!("generated enum {name} already used by {other}"),
                ));
            }
        }
        Ok(self.dbc)
    }
}

/// Parse and validate a full DBC document for `self_node`.
///
/// # Errors
/// The first invariant violation met in document order.
pub fn dbc_from_str(dbc_str: &str, self_node: &str) -> Result<DbcObject, DbcError> {
    let mut builder = DbcBuilder::new(self_node);
    for (idx, line) in dbc_str.lines().enumerate() {
        builder.parse_line(idx + 1, line)?;
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_record_with_plain_role() {
        let (_, sig) = all_consuming(signal)(
            r#"SG_ IO_DEBUG_test_signed : 16|8@1- (1,-128) [0|0] "" DBG"#,
        )
        .unwrap();
        assert_eq!(sig.name, "IO_DEBUG_test_signed");
        assert_eq!(sig.mux, MultiplexIndicator::Plain);
        assert_eq!((sig.start, sig.size), (16, 8));
        assert_eq!(sig.value_type, ValueType::Signed);
        assert_eq!(sig.offset.literal, "-128");
        assert_eq!(sig.receivers, ["DBG"]);
    }

    #[test]
    fn signal_record_mux_roles() {
        let (_, sig) =
            all_consuming(signal)(r#"SG_ SONARS_mux M : 0|4@1+ (1,0) [0|0] "" DRIVER,IO"#).unwrap();
        assert_eq!(sig.mux, MultiplexIndicator::Multiplexor);
        assert_eq!(sig.receivers, ["DRIVER", "IO"]);

        let (_, sig) =
            all_consuming(signal)(r#"SG_ SONARS_left m1 : 16|12@1+ (0.1,0) [0|400] "cm" DRIVER"#)
                .unwrap();
        assert_eq!(sig.mux, MultiplexIndicator::MultiplexedSignal(1));
        assert_eq!(sig.scale.literal, "0.1");
        assert_eq!(sig.unit, "cm");

        let (_, sig) = all_consuming(signal)(r#"SG_ sub m2M : 8|4@1+ (1,0) [0|0] "" IO"#).unwrap();
        assert_eq!(sig.mux, MultiplexIndicator::MultiplexorAndMultiplexedSignal(2));
    }

    #[test]
    fn header_and_nodes_records() {
        let (_, hdr) = all_consuming(message_header)("BO_ 100 DRIVER_HEARTBEAT: 1 DRIVER").unwrap();
        assert_eq!(
            hdr,
            HeaderRecord { id: 100, name: "DRIVER_HEARTBEAT".to_owned(), size: 1, transmitter: "DRIVER".to_owned() }
        );
        let (_, nodes) = all_consuming(node_list)("BU_: DRIVER IO MOTOR ").unwrap();
        assert_eq!(nodes, ["DRIVER", "IO", "MOTOR"]);
    }

    #[test]
    fn value_tables() {
        let (_, table) = all_consuming(enum_table)(
            r#"VAL_ 100 DRIVER_HEARTBEAT_cmd 2 "REBOOT" 1 "SYNC" 0 "NOOP" ;"#,
        )
        .unwrap();
        let (id, name, values) = table.unwrap();
        assert_eq!((id, name.as_str()), (100, "DRIVER_HEARTBEAT_cmd"));
        assert_eq!(values[0], ValDescription { raw: 2, label: "REBOOT".to_owned() });
        assert_eq!(values.len(), 3);

        let (_, table) = all_consuming(enum_table)(r#"VAL_ EnvMode 0 "OFF" 1 "ON";"#).unwrap();
        assert!(table.is_none());
    }

    #[test]
    fn field_type_target() {
        let (_, target) =
            field_type(r#"BA_ "FieldType" SG_ 100 DRIVER_HEARTBEAT_cmd "DRIVER_HEARTBEAT_cmd";"#)
                .unwrap();
        assert_eq!(target, Some((100, "DRIVER_HEARTBEAT_cmd".to_owned())));
        let (_, target) = field_type(r#"BA_ "FieldType" BO_ 100 "x";"#).unwrap();
        assert!(target.is_none());
    }

    #[test]
    fn broken_record_reports_line() {
        let error = dbc_from_str("BU_: A\n\nBO_ 10 M 8 A\n", "A").unwrap_err();
        assert!(matches!(error, DbcError::Parsing { line: 3, .. }));
    }

    #[test]
    fn physical_range_follows_sign_and_offset() {
        let dbc = "BU_: A\nBO_ 1 M: 2 A\n SG_ s : 0|8@1+ (1,-40) [-40|215] \"\" A\n";
        assert!(dbc_from_str(dbc, "A").is_ok());

        let dbc = "BU_: A\nBO_ 1 M: 2 A\n SG_ s : 0|8@1+ (1,-40) [-40|216] \"\" A\n";
        assert_eq!(dbc_from_str(dbc, "A").unwrap_err().uid(), "signal-max-too-high");

        let dbc = "BU_: A\nBO_ 1 M: 2 A\n SG_ s : 0|8@1- (1,0) [-129|0] \"\" A\n";
        assert_eq!(dbc_from_str(dbc, "A").unwrap_err().uid(), "signal-min-too-low");
    }

    #[test]
    fn unflagged_table_is_ignored() {
        let dbc = "BU_: A\nBO_ 1 M: 1 A\n SG_ s : 0|2@1+ (1,0) [0|0] \"\" A\nVAL_ 1 s 1 \"ON\" 0 \"OFF\" ;\n";
        let model = dbc_from_str(dbc, "A").unwrap();
        let signal = &model.messages()[0].signals()[0];
        assert!(!signal.is_enum());
        assert!(signal.storage.is_unsigned());
    }
}
