/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
 * Frame layout: bit 0 is the LSB of byte 0, bit 8 the LSB of byte 1, ...
 * A signal occupies bit_size consecutive bits from bit_start and may cross
 * byte boundaries; only this (little endian / Intel) ordering is supported.
 */

use crate::data::{Message, MsgHdr, Signal};
use crate::mia::{MiaInfo, MiaTracked};
use crate::mux::{MuxLayout, SignalGroup};
use crate::types::{DbcValue, StorageType};

/// Frames are always handled as 8 byte buffers.
pub type CanData = [u8; 8];

/// Part of a signal held by one frame byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ByteStep {
    /// frame byte index
    pub byte: usize,
    /// first bit within that byte
    pub bit: u32,
    /// number of bits in that byte
    pub width: u32,
    /// position of those bits within the raw value
    pub raw_shift: u32,
}

impl ByteStep {
    #[must_use]
    pub fn mask(&self) -> u8 {
        ((1u16 << self.width) - 1) as u8
    }
}

/// Byte walk of one signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitLayout {
    start: u32,
    size: u32,
    steps: Vec<ByteStep>,
}

impl BitLayout {
    #[must_use]
    pub fn new(start: u32, size: u32) -> Self {
        let mut steps = Vec::new();
        let mut bit_pos = start;
        let mut remaining = size;
        let mut raw_shift = 0;

        while remaining > 0 {
            let width = (8 - bit_pos % 8).min(remaining);
            steps.push(ByteStep { byte: (bit_pos / 8) as usize, bit: bit_pos % 8, width, raw_shift });
            bit_pos += width;
            remaining -= width;
            raw_shift += width;
        }
        BitLayout { start, size, steps }
    }

    #[must_use]
    pub fn steps(&self) -> &[ByteStep] {
        &self.steps
    }

    #[must_use]
    pub fn start(&self) -> u32 {
        self.start
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Mask keeping the `size` low bits of a raw value.
    #[must_use]
    pub fn raw_mask(&self) -> u32 {
        if self.size >= 32 {
            u32::MAX
        } else {
            (1u32 << self.size) - 1
        }
    }

    /// OR the low `size` bits of `raw` into the frame.
    pub fn pack(&self, raw: u32, bytes: &mut CanData) {
        for step in &self.steps {
            bytes[step.byte] |= (((raw >> step.raw_shift) as u8) & step.mask()) << step.bit;
        }
    }

    #[must_use]
    pub fn unpack(&self, bytes: &CanData) -> u32 {
        let mut raw = 0u32;
        for step in &self.steps {
            raw |= u32::from((bytes[step.byte] >> step.bit) & step.mask()) << step.raw_shift;
        }
        raw
    }
}

/// Encode side clamping of the physical value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Clamp {
    /// `None` when the lower bound is implied by an unsigned storage.
    pub min: Option<f64>,
    pub max: f64,
}

/// Everything needed to move one signal between its physical value and the frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalCodec {
    pub name: String,
    pub layout: BitLayout,
    pub scale: f64,
    pub offset: f64,
    pub signed: bool,
    pub clamp: Option<Clamp>,
    pub storage: StorageType,
}

impl SignalCodec {
    #[must_use]
    pub fn new(signal: &Signal) -> Self {
        let clamp = if signal.has_bounds() {
            let min = if signal.storage.is_unsigned() && signal.min.is_zero() {
                None
            } else {
                Some(signal.min.value)
            };
            Some(Clamp { min, max: signal.max.value })
        } else {
            None
        };

        SignalCodec {
            name: signal.name.clone(),
            layout: BitLayout::new(signal.bit_start, signal.bit_size),
            scale: signal.scale.value,
            offset: signal.offset.value,
            signed: signal.is_signed(),
            clamp,
            storage: signal.storage.clone(),
        }
    }

    #[must_use]
    pub fn clamp(&self, physical: f64) -> f64 {
        let Some(clamp) = self.clamp else {
            return physical;
        };
        let mut value = physical;
        if let Some(min) = clamp.min {
            if value < min {
                value = min;
            }
        }
        if value > clamp.max {
            value = clamp.max;
        }
        value
    }

    /// `round((physical - offset) / scale)` truncated to the signal width;
    /// negative values keep their two's complement bits.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_raw(&self, physical: f64) -> u32 {
        let value = self.clamp(physical);
        let raw = ((value - self.offset) / self.scale).round() as i64;
        (raw as u32) & self.layout.raw_mask()
    }

    pub fn encode(&self, physical: f64, bytes: &mut CanData) {
        let raw = self.to_raw(physical);
        log::trace!("encode {}={} raw=0x{:x}", self.name, physical, raw);
        self.layout.pack(raw, bytes);
    }

    /// Raw value as a signed quantity, sign extended when the sign bit is set.
    #[must_use]
    pub fn sign_extend(&self, raw: u32) -> i64 {
        let size = self.layout.size();
        if self.signed && raw & (1u32 << (size - 1)) != 0 {
            i64::from((raw | (0xFFFF_FFFFu32 << (size - 1))) as i32)
        } else {
            i64::from(raw)
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn physical(&self, raw: u32) -> f64 {
        self.sign_extend(raw) as f64 * self.scale + self.offset
    }

    #[must_use]
    pub fn decode(&self, bytes: &CanData) -> DbcValue {
        self.storage.cast(self.physical(self.layout.unpack(bytes)))
    }
}

/// Field values of one structure (message or branch) in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupStore {
    pub branch: Option<u32>,
    fields: Vec<(String, DbcValue)>,
    pub mia_info: MiaInfo,
}

impl GroupStore {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<DbcValue> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, value)| *value)
    }

    /// Returns false when `name` is not a field of this structure.
    pub fn set(&mut self, name: &str, value: DbcValue) -> bool {
        match self.fields.iter_mut().find(|(field, _)| field == name) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, DbcValue)] {
        &self.fields
    }
}

impl MiaTracked for GroupStore {
    fn mia_info(&self) -> &MiaInfo {
        &self.mia_info
    }

    fn mia_info_mut(&mut self) -> &mut MiaInfo {
        &mut self.mia_info
    }
}

/// Receive side storage of a message: one group per branch (a single one
/// when the message is not multiplexed).
#[derive(Clone, Debug, PartialEq)]
pub struct MessageStore {
    groups: Vec<GroupStore>,
}

impl MessageStore {
    #[must_use]
    pub fn group(&self, branch: Option<u32>) -> Option<&GroupStore> {
        self.groups.iter().find(|group| group.branch == branch)
    }

    pub fn group_mut(&mut self, branch: Option<u32>) -> Option<&mut GroupStore> {
        self.groups.iter_mut().find(|group| group.branch == branch)
    }

    #[must_use]
    pub fn groups(&self) -> &[GroupStore] {
        &self.groups
    }
}

/// Executable encode/decode of one message.
#[derive(Clone, Debug)]
pub struct MessageCodec {
    name: String,
    hdr: MsgHdr,
    signals: Vec<SignalCodec>,
    layout: MuxLayout,
}

impl MessageCodec {
    #[must_use]
    pub fn new(msg: &Message) -> Self {
        MessageCodec {
            name: msg.name.clone(),
            hdr: msg.header(),
            signals: msg.signals().iter().map(SignalCodec::new).collect(),
            layout: MuxLayout::resolve(msg),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn header(&self) -> MsgHdr {
        self.hdr
    }

    #[must_use]
    pub fn layout(&self) -> &MuxLayout {
        &self.layout
    }

    #[must_use]
    pub fn signals(&self) -> &[SignalCodec] {
        &self.signals
    }

    #[must_use]
    pub fn signal(&self, name: &str) -> Option<&SignalCodec> {
        self.signals.iter().find(|codec| codec.name == name)
    }

    fn new_group(&self, group: &SignalGroup) -> GroupStore {
        GroupStore {
            branch: group.branch,
            fields: group
                .signals
                .iter()
                .map(|idx| {
                    let codec = &self.signals[*idx];
                    (codec.name.clone(), codec.storage.zero())
                })
                .collect(),
            mia_info: MiaInfo::default(),
        }
    }

    /// Zeroed storage for every structure of this message.
    #[must_use]
    pub fn new_store(&self) -> MessageStore {
        MessageStore { groups: self.layout.groups().iter().map(|group| self.new_group(group)).collect() }
    }

    /// Zeroed transmit structure for `branch` (`None` on plain messages).
    #[must_use]
    pub fn new_group_store(&self, branch: Option<u32>) -> Option<GroupStore> {
        self.layout.group(branch).map(|group| self.new_group(group))
    }

    /// Zero the frame then pack the selector (multiplexed messages), the
    /// shared signals and the branch signals of `from`. Fields missing from
    /// `from` are packed as zero raw bits. The selector carries the raw
    /// branch index, matching the raw dispatch done by [`MessageCodec::decode`].
    pub fn encode(&self, from: &GroupStore, bytes: &mut CanData) -> MsgHdr {
        *bytes = [0; 8];

        if let (Some(selector), Some(branch)) = (self.layout.selector(), from.branch) {
            let layout = &self.signals[selector].layout;
            layout.pack(branch & layout.raw_mask(), bytes);
        }

        if let Some(group) = self.layout.group(from.branch) {
            for idx in &group.signals {
                let codec = &self.signals[*idx];
                if let Some(value) = from.get(&codec.name) {
                    codec.encode(value.as_f64(), bytes);
                }
            }
        }
        self.hdr
    }

    /// Decode `bytes` into `to`. Fails without touching `to` when `hdr` does
    /// not match this message, or when no branch matches the selector.
    /// A successful decode resets the MIA counter of the updated structure.
    pub fn decode(&self, to: &mut MessageStore, bytes: &CanData, hdr: Option<&MsgHdr>) -> bool {
        if let Some(hdr) = hdr {
            if *hdr != self.hdr {
                log::debug!("decode {} rejected header {:?} expected {:?}", self.name, hdr, self.hdr);
                return false;
            }
        }

        let selector_raw = match self.layout.selector() {
            Some(selector) => self.signals[selector].layout.unpack(bytes),
            None => 0,
        };
        let Some(group) = self.layout.dispatch(selector_raw) else {
            log::debug!("decode {} no branch for mux:{}", self.name, selector_raw);
            return false;
        };
        let Some(store) = to.group_mut(group.branch) else {
            return false;
        };

        for idx in &group.signals {
            let codec = &self.signals[*idx];
            store.set(&codec.name, codec.decode(bytes));
        }
        store.mia_info.reset();
        true
    }
}
