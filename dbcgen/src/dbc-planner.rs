/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

use crate::data::{Message, Signal};

/// Whether an artifact is generated or replaced by a placeholder comment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Emit {
    Full,
    Placeholder,
}

impl Emit {
    fn when(flag: bool) -> Self {
        if flag {
            Emit::Full
        } else {
            Emit::Placeholder
        }
    }

    #[must_use]
    pub fn is_full(self) -> bool {
        self == Emit::Full
    }
}

/// Per message decision of what gets materialized.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MessagePlan {
    /// `<MSG>_HDR` constant
    pub header: Emit,
    /// structures and enumerations
    pub types: Emit,
    pub encode: Emit,
    pub decode: Emit,
    /// staleness monitor, also decides the `mia_info` field and host imports
    pub mia: Emit,
}

impl MessagePlan {
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        !self.types.is_full()
    }
}

/// Target node and "generate all" override of one compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmitScope {
    self_node: String,
    gen_all: bool,
}

impl EmitScope {
    #[must_use]
    pub fn new(self_node: &str, gen_all: bool) -> Self {
        EmitScope { self_node: self_node.to_owned(), gen_all }
    }

    #[must_use]
    pub fn self_node(&self) -> &str {
        &self.self_node
    }

    #[must_use]
    pub fn gen_all(&self) -> bool {
        self.gen_all
    }

    #[must_use]
    pub fn is_sender(&self, msg: &Message) -> bool {
        msg.transmitter == self.self_node
    }

    #[must_use]
    pub fn is_recipient(&self, msg: &Message) -> bool {
        msg.is_recipient(&self.self_node)
    }

    /// Structure field of `signal` is present when the node either builds or
    /// consumes it.
    #[must_use]
    pub fn includes_signal(&self, msg: &Message, signal: &Signal) -> bool {
        self.gen_all || self.is_sender(msg) || signal.is_receiver(&self.self_node)
    }

    #[must_use]
    pub fn plan(&self, msg: &Message) -> MessagePlan {
        let sender = self.is_sender(msg);
        let recipient = self.is_recipient(msg);
        let types = Emit::when(self.gen_all || sender || recipient);
        let decode = Emit::when(self.gen_all || recipient);

        MessagePlan {
            header: types,
            types,
            encode: Emit::when(self.gen_all || sender),
            decode,
            mia: decode,
        }
    }
}
