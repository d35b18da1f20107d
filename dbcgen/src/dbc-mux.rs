/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

use crate::data::{to_kamel, to_shouty, to_snake, Message, MuxRole, Signal};
use crate::error::DbcError;

/// Signals materialized together in one structure: the whole message when
/// not multiplexed, else shared signals followed by one branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalGroup {
    pub branch: Option<u32>,
    /// Indexes into the message signal list, in declaration order.
    pub signals: Vec<usize>,
}

impl SignalGroup {
    /// Branch tag as written in the DBC (`m3`).
    #[must_use]
    pub fn tag(&self) -> Option<String> {
        self.branch.map(|index| format!("m{index}"))
    }
}

/// Names of the items generated for one structure: the message itself, or
/// one branch of a multiplexed message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupNames {
    /// struct name
    pub kamel: String,
    /// routine suffix
    pub snake: String,
    /// host constants prefix
    pub shouty: String,
}

impl GroupNames {
    #[must_use]
    pub fn new(msg: &Message, group: &SignalGroup) -> Self {
        match group.tag() {
            None => GroupNames {
                kamel: msg.get_type_kamel(),
                snake: msg.get_type_snake(),
                shouty: msg.get_type_shouty(),
            },
            Some(tag) => {
                let name = format!("{}_{tag}", msg.name);
                GroupNames { kamel: to_kamel(&name), snake: to_snake(&name), shouty: to_shouty(&name) }
            }
        }
    }

    #[must_use]
    pub fn mia_ms(&self) -> String {
        format!("{}__MIA_MS", self.shouty)
    }

    #[must_use]
    pub fn mia_msg(&self) -> String {
        format!("{}__MIA_MSG", self.shouty)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MuxLayout {
    Plain(SignalGroup),
    Multiplexed {
        selector: usize,
        shared: Vec<usize>,
        groups: Vec<SignalGroup>,
    },
}

impl MuxLayout {
    /// Split the message signals into selector, shared signals and branch
    /// groups. Branches keep the order of their first signal.
    #[must_use]
    pub fn resolve(msg: &Message) -> MuxLayout {
        let signals = msg.signals();
        let selector = signals.iter().position(|signal| signal.mux == MuxRole::Selector);

        let Some(selector) = selector else {
            return MuxLayout::Plain(SignalGroup { branch: None, signals: (0..signals.len()).collect() });
        };

        let shared: Vec<usize> = signals
            .iter()
            .enumerate()
            .filter(|(_, signal)| signal.mux == MuxRole::Plain)
            .map(|(idx, _)| idx)
            .collect();

        let mut groups: Vec<SignalGroup> = Vec::new();
        for (idx, signal) in signals.iter().enumerate() {
            let MuxRole::Branch(index) = signal.mux else {
                continue;
            };
            if let Some(group) = groups.iter_mut().find(|group| group.branch == Some(index)) {
                group.signals.push(idx);
            } else {
                let mut members = shared.clone();
                members.push(idx);
                groups.push(SignalGroup { branch: Some(index), signals: members });
            }
        }

        MuxLayout::Multiplexed { selector, shared, groups }
    }

    #[must_use]
    pub fn groups(&self) -> &[SignalGroup] {
        match self {
            MuxLayout::Plain(group) => std::slice::from_ref(group),
            MuxLayout::Multiplexed { groups, .. } => groups,
        }
    }

    #[must_use]
    pub fn selector(&self) -> Option<usize> {
        match self {
            MuxLayout::Plain(_) => None,
            MuxLayout::Multiplexed { selector, .. } => Some(*selector),
        }
    }

    #[must_use]
    pub fn is_muxed(&self) -> bool {
        matches!(self, MuxLayout::Multiplexed { .. })
    }

    #[must_use]
    pub fn group(&self, branch: Option<u32>) -> Option<&SignalGroup> {
        self.groups().iter().find(|group| group.branch == branch)
    }

    /// Group selected by the raw selector value read from a frame.
    #[must_use]
    pub fn dispatch(&self, selector_raw: u32) -> Option<&SignalGroup> {
        match self {
            MuxLayout::Plain(group) => Some(group),
            MuxLayout::Multiplexed { groups, .. } => {
                groups.iter().find(|group| group.branch == Some(selector_raw))
            }
        }
    }
}

#[derive(Clone, Debug)]
struct Span {
    name: String,
    role: MuxRole,
    start: u32,
    end: u32,
}

impl Span {
    fn overlaps(&self, start: u32, end: u32) -> bool {
        self.start < end && start < self.end
    }

    /// Two signals can share bits only when they sit in distinct branches.
    fn excludes(&self, role: MuxRole) -> bool {
        match (self.role, role) {
            (MuxRole::Branch(left), MuxRole::Branch(right)) => left == right,
            _ => true,
        }
    }
}

/// Per message multiplexing and bit-range bookkeeping used while the signal
/// records of one message are parsed.
#[derive(Clone, Debug, Default)]
pub(crate) struct MuxTracker {
    selector: Option<Span>,
    width: u32,
    spans: Vec<Span>,
}

impl MuxTracker {
    /// Multiplex consistency: one selector, branch index inside
    /// `[0, 2^width)`, nothing inside the selector bits.
    pub fn check_mux(&self, signal: &Signal) -> Result<(), DbcError> {
        match signal.mux {
            MuxRole::Selector => {
                if let Some(selector) = &self.selector {
                    return Err(DbcError::validation(
                        "mux-selector-duplicate",
                        &signal.name,
                        format!("second multiplexor, message already uses {}", selector.name),
                    ));
                }
            }
            MuxRole::Branch(index) => {
                let Some(selector) = &self.selector else {
                    return Err(DbcError::validation(
                        "mux-selector-missing",
                        &signal.name,
                        format!("mux index m{index} declared before any multiplexor signal"),
                    ));
                };
                let domain = 1u64 << self.width;
                if u64::from(index) >= domain {
                    return Err(DbcError::validation(
                        "mux-index-out-of-range",
                        &signal.name,
                        format!(
                            "mux index out of bounds, m{index} not in [0..{domain}) of {}-bit selector {}",
                            self.width, selector.name
                        ),
                    ));
                }
            }
            MuxRole::Plain => {}
        }

        if let Some(selector) = &self.selector {
            if selector.overlaps(signal.bit_start, signal.bit_end()) {
                return Err(DbcError::validation(
                    "mux-index-overwrite",
                    &signal.name,
                    format!(
                        "bits [{}..{}) overwrite mux index {} [{}..{})",
                        signal.bit_start,
                        signal.bit_end(),
                        selector.name,
                        selector.start,
                        selector.end
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Interval overlap against every signal already seen that can be
    /// present in the same frame.
    pub fn check_overlap(&self, signal: &Signal) -> Result<(), DbcError> {
        let clash = self.spans.iter().find(|span| {
            span.excludes(signal.mux) && span.overlaps(signal.bit_start, signal.bit_end())
        });

        match clash {
            None => Ok(()),
            Some(span) => Err(DbcError::validation(
                "signal-overlap",
                &signal.name,
                format!(
                    "bits [{}..{}) overlap signal {} [{}..{})",
                    signal.bit_start,
                    signal.bit_end(),
                    span.name,
                    span.start,
                    span.end
                ),
            )),
        }
    }

    pub fn accept(&mut self, signal: &Signal) {
        let span = Span {
            name: signal.name.clone(),
            role: signal.mux,
            start: signal.bit_start,
            end: signal.bit_end(),
        };
        if signal.mux == MuxRole::Selector {
            self.width = signal.bit_size;
            self.selector = Some(span.clone());
        }
        self.spans.push(span);
    }

    pub fn has_selector(&self) -> bool {
        self.selector.is_some()
    }

    pub fn has_branch(&self) -> bool {
        self.spans.iter().any(|span| matches!(span.role, MuxRole::Branch(_)))
    }

    pub fn selector_name(&self) -> Option<&str> {
        self.selector.as_ref().map(|span| span.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ByteOrder, DbcNumber, MessageId, ValueType};
    use crate::types::StorageType;

    fn signal(name: &str, start: u32, size: u32, mux: MuxRole) -> Signal {
        Signal {
            name: name.to_owned(),
            bit_start: start,
            bit_size: size,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            scale: DbcNumber::new("1", 1.0),
            offset: DbcNumber::new("0", 0.0),
            min: DbcNumber::new("0", 0.0),
            max: DbcNumber::new("0", 0.0),
            unit: String::new(),
            receivers: vec!["IO".to_owned()],
            mux,
            field_type: false,
            enum_info: Vec::new(),
            storage: StorageType::default(),
        }
    }

    fn track(tracker: &mut MuxTracker, signal: &Signal) -> Result<(), DbcError> {
        tracker.check_mux(signal)?;
        tracker.check_overlap(signal)?;
        tracker.accept(signal);
        Ok(())
    }

    #[test]
    fn layout_groups_shared_then_branch() {
        let mut msg = Message::new(MessageId(200), "SONARS", 8, "SENSOR");
        msg.add_signal(signal("mux", 0, 4, MuxRole::Selector));
        msg.add_signal(signal("err", 4, 12, MuxRole::Plain));
        msg.add_signal(signal("left", 16, 12, MuxRole::Branch(0)));
        msg.add_signal(signal("raw_left", 16, 12, MuxRole::Branch(1)));
        msg.add_signal(signal("right", 28, 12, MuxRole::Branch(0)));

        let layout = MuxLayout::resolve(&msg);
        assert_eq!(layout.selector(), Some(0));
        let groups = layout.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], SignalGroup { branch: Some(0), signals: vec![1, 2, 4] });
        assert_eq!(groups[1], SignalGroup { branch: Some(1), signals: vec![1, 3] });
        assert_eq!(layout.dispatch(1).and_then(SignalGroup::tag), Some("m1".to_owned()));
        assert!(layout.dispatch(7).is_none());
    }

    #[test]
    fn plain_layout_is_single_group() {
        let mut msg = Message::new(MessageId(100), "HEARTBEAT", 1, "DRIVER");
        msg.add_signal(signal("cmd", 0, 8, MuxRole::Plain));
        let layout = MuxLayout::resolve(&msg);
        assert!(!layout.is_muxed());
        assert_eq!(layout.groups().len(), 1);
        assert_eq!(layout.dispatch(42).map(|g| g.signals.clone()), Some(vec![0]));
    }

    #[test]
    fn branch_index_bounded_by_selector_width() {
        let mut tracker = MuxTracker::default();
        track(&mut tracker, &signal("mux", 0, 2, MuxRole::Selector)).unwrap();
        assert!(track(&mut tracker, &signal("b3", 8, 4, MuxRole::Branch(3))).is_ok());
        let error = track(&mut tracker, &signal("b4", 16, 4, MuxRole::Branch(4))).unwrap_err();
        assert_eq!(error.uid(), "mux-index-out-of-range");
    }

    #[test]
    fn branch_cannot_overwrite_selector() {
        let mut tracker = MuxTracker::default();
        track(&mut tracker, &signal("mux", 0, 4, MuxRole::Selector)).unwrap();
        let error = track(&mut tracker, &signal("low", 2, 4, MuxRole::Branch(0))).unwrap_err();
        assert_eq!(error.uid(), "mux-index-overwrite");
    }

    #[test]
    fn branches_share_bits_but_not_with_shared() {
        let mut tracker = MuxTracker::default();
        track(&mut tracker, &signal("mux", 0, 4, MuxRole::Selector)).unwrap();
        track(&mut tracker, &signal("a0", 8, 8, MuxRole::Branch(0))).unwrap();
        track(&mut tracker, &signal("a1", 8, 8, MuxRole::Branch(1))).unwrap();
        let error = track(&mut tracker, &signal("b0", 12, 8, MuxRole::Branch(0))).unwrap_err();
        assert_eq!(error.uid(), "signal-overlap");
        let error = track(&mut tracker, &signal("shared", 10, 2, MuxRole::Plain)).unwrap_err();
        assert_eq!(error.uid(), "signal-overlap");
    }

    #[test]
    fn overlap_detected_regardless_of_order() {
        let mut tracker = MuxTracker::default();
        track(&mut tracker, &signal("high", 8, 8, MuxRole::Plain)).unwrap();
        track(&mut tracker, &signal("low", 0, 8, MuxRole::Plain)).unwrap();
        let error = track(&mut tracker, &signal("mid", 4, 8, MuxRole::Plain)).unwrap_err();
        assert!(error.to_string().contains("mid"));
    }

    #[test]
    fn branch_requires_selector() {
        let tracker = MuxTracker::default();
        let error = tracker.check_mux(&signal("b0", 8, 8, MuxRole::Branch(0))).unwrap_err();
        assert_eq!(error.uid(), "mux-selector-missing");
    }
}
