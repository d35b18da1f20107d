/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
 */

//! IO node of `etc/sample.dbc`, with every message generated (`ALL = 1`).
//!
//! The encode/decode module is produced at compilation time by
//! `build.rs->DbcCompiler::new("dbc_sample")`. This crate supplies what the
//! generated module imports from its parent: the frame transmit function and
//! the MIA threshold/replacement value of every received structure.

use std::sync::Mutex;

// include generated code and Rust module as declared in build.rs
include!(concat!(env!("OUT_DIR"), "/__sample-dbcgen.rs"));
pub use dbc_sample::*;

/// Frame handed to the bus by `dbc_app_send_can_msg`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SentFrame {
    pub mid: u32,
    pub dlc: u8,
    pub data: [u8; 8],
}

static SENT_FRAMES: Mutex<Vec<SentFrame>> = Mutex::new(Vec::new());

/// Transmit primitive: frames are queued in memory, oldest first.
pub fn dbc_app_send_can_msg(mid: u32, dlc: u8, bytes: &[u8; 8]) -> bool {
    match SENT_FRAMES.lock() {
        Ok(mut frames) => {
            frames.push(SentFrame { mid, dlc, data: *bytes });
            true
        }
        Err(_) => false,
    }
}

#[must_use]
pub fn sent_frames() -> Vec<SentFrame> {
    SENT_FRAMES.lock().map(|frames| frames.to_vec()).unwrap_or_default()
}

pub const DRIVER_HEARTBEAT__MIA_MS: u32 = 300;
pub const DRIVER_HEARTBEAT__MIA_MSG: DriverHeartbeat = DriverHeartbeat {
    driver_heartbeat_cmd: DbcDriverHeartbeatDriverHeartbeatCmd::from_raw(0),
    mia_info: DbcMiaInfo::new(),
};

pub const MOTOR_CMD__MIA_MS: u32 = 300;
pub const MOTOR_CMD__MIA_MSG: MotorCmd = MotorCmd { motor_cmd_steer: 0, motor_cmd_drive: 0, mia_info: DbcMiaInfo::new() };

pub const SENSOR_SONARS_M0__MIA_MS: u32 = 500;
pub const SENSOR_SONARS_M0__MIA_MSG: SensorSonarsM0 = SensorSonarsM0 {
    sensor_sonars_err_count: 0,
    sensor_sonars_left: 0.0,
    sensor_sonars_middle: 0.0,
    sensor_sonars_right: 0.0,
    sensor_sonars_rear: 0.0,
    mia_info: DbcMiaInfo::new(),
};

pub const SENSOR_SONARS_M1__MIA_MS: u32 = 500;
pub const SENSOR_SONARS_M1__MIA_MSG: SensorSonarsM1 = SensorSonarsM1 {
    sensor_sonars_err_count: 0,
    sensor_sonars_no_filt_left: 0.0,
    sensor_sonars_no_filt_middle: 0.0,
    sensor_sonars_no_filt_right: 0.0,
    sensor_sonars_no_filt_rear: 0.0,
    mia_info: DbcMiaInfo::new(),
};

// a silent motor is reported as a wheel error
pub const MOTOR_STATUS__MIA_MS: u32 = 300;
pub const MOTOR_STATUS__MIA_MSG: MotorStatus =
    MotorStatus { motor_status_wheel_error: 1, motor_status_speed_kph: 0.0, mia_info: DbcMiaInfo::new() };

pub const IO_DEBUG__MIA_MS: u32 = 1000;
pub const IO_DEBUG__MIA_MSG: IoDebug = IoDebug {
    io_debug_test_unsigned: 0,
    io_debug_test_enum: DbcIoDebugIoDebugTestEnum::from_raw(0),
    io_debug_test_signed: 0,
    io_debug_test_float: 0.0,
    mia_info: DbcMiaInfo::new(),
};
