/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

#[cfg(feature = "serde")]
use serde::Serialize;

/// Missing in action bookkeeping attached to every received structure.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MiaInfo {
    pub is_mia: bool,
    pub mia_counter_ms: u32,
}

impl MiaInfo {
    /// Called on every successful decode.
    pub fn reset(&mut self) {
        self.is_mia = false;
        self.mia_counter_ms = 0;
    }
}

/// Storage carrying a [`MiaInfo`].
pub trait MiaTracked {
    fn mia_info(&self) -> &MiaInfo;
    fn mia_info_mut(&mut self) -> &mut MiaInfo;
}

/// Advance the staleness counter of `msg` by `time_incr_ms`.
///
/// On the tick reaching `threshold_ms` the storage is overwritten with
/// `default`, the counter is pinned at the threshold and `true` is returned.
/// Once stale, further ticks return `false` and leave the storage alone until
/// a decode resets the counter.
pub fn handle_mia<T>(msg: &mut T, default: &T, threshold_ms: u32, time_incr_ms: u32) -> bool
where
    T: MiaTracked + Clone,
{
    if msg.mia_info().is_mia {
        return false;
    }

    let counter = msg.mia_info().mia_counter_ms.saturating_add(time_incr_ms);
    if counter < threshold_ms {
        msg.mia_info_mut().mia_counter_ms = counter;
        return false;
    }

    log::debug!("mia threshold:{threshold_ms}ms reached, restoring default payload");
    *msg = default.clone();
    let info = msg.mia_info_mut();
    info.mia_counter_ms = threshold_ms;
    info.is_mia = true;
    true
}
