/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

use bitvec::prelude::*;
use dbcgen::prelude::*;

const HEARTBEAT: &str = "BU_: DRIVER MOTOR
BO_ 100 HEARTBEAT: 1 DRIVER
 SG_ cmd : 0|8@1+ (1,0) [0|0] \"\" MOTOR
";

const DEBUG: &str = "BU_: IO DBG
BO_ 500 IO_DEBUG: 6 IO
 SG_ test_signed : 0|8@1- (1,0) [0|0] \"\" DBG
 SG_ test_unsigned : 8|8@1+ (1,0) [0|0] \"\" DBG
 SG_ distance : 20|12@1+ (0.1,0) [0|0] \"\" DBG
 SG_ steer : 32|4@1- (1,0) [-5|5] \"\" DBG
 SG_ drive : 36|4@1+ (1,0) [0|9] \"\" DBG
 SG_ temp : 40|8@1+ (1,-40) [-40|215] \"\" DBG
";

const SONARS: &str = "BU_: SENSOR DRIVER
BO_ 200 SENSOR_SONARS: 8 SENSOR
 SG_ mux M : 0|4@1+ (1,0) [0|0] \"\" DRIVER
 SG_ err_count : 4|12@1+ (1,0) [0|0] \"\" DRIVER
 SG_ left m0 : 16|12@1+ (0.1,0) [0|0] \"\" DRIVER
 SG_ right m0 : 28|12@1+ (0.1,0) [0|0] \"\" DRIVER
 SG_ no_filt_left m1 : 16|12@1+ (0.1,0) [0|0] \"\" DRIVER
";

fn codec(dbc: &str, node: &str, id: u32) -> MessageCodec {
    let model = DbcObject::parse(dbc, node).unwrap();
    MessageCodec::new(model.message(MessageId(id)).unwrap())
}

#[test]
fn heartbeat_encode_single_byte() {
    let codec = codec(HEARTBEAT, "DRIVER", 100);
    let mut from = codec.new_group_store(None).unwrap();
    assert!(from.set("cmd", DbcValue::U8(5)));

    let mut bytes = [0xaa; 8];
    let hdr = codec.encode(&from, &mut bytes);
    assert_eq!(bytes, [0x05, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(hdr, MsgHdr { mid: 100, dlc: 1 });
}

#[test]
fn heartbeat_decode_resets_mia() {
    let codec = codec(HEARTBEAT, "MOTOR", 100);
    let mut store = codec.new_store();
    store.group_mut(None).unwrap().mia_info = MiaInfo { is_mia: true, mia_counter_ms: 250 };

    let bytes = [0x05, 0, 0, 0, 0, 0, 0, 0];
    assert!(codec.decode(&mut store, &bytes, Some(&MsgHdr { mid: 100, dlc: 1 })));

    let group = store.group(None).unwrap();
    assert_eq!(group.get("cmd"), Some(DbcValue::U8(5)));
    assert_eq!(group.mia_info, MiaInfo::default());
}

#[test]
fn signed_minus_one_is_all_ones() {
    let codec = codec(DEBUG, "IO", 500);
    let signal = codec.signal("test_signed").unwrap();

    let mut bytes = [0u8; 8];
    signal.encode(-1.0, &mut bytes);
    assert_eq!(bytes[0], 0xff);
    assert_eq!(signal.decode(&bytes), DbcValue::I16(-1));

    let mut bytes = [0u8; 8];
    signal.encode(-128.0, &mut bytes);
    assert_eq!(bytes[0], 0x80);
    assert_eq!(signal.decode(&bytes), DbcValue::I16(-128));
}

#[test]
fn round_trip_within_half_scale() {
    let codec = codec(DEBUG, "IO", 500);
    let signal = codec.signal("distance").unwrap();

    for physical in [0.0, 0.04, 0.1, 12.34, 200.0, 409.5] {
        let mut bytes = [0u8; 8];
        signal.encode(physical, &mut bytes);
        let decoded = signal.decode(&bytes).as_f64();
        assert!((decoded - physical).abs() <= 0.05 + 1e-6, "{physical} decoded as {decoded}");
    }
}

#[test]
fn encode_touches_only_signal_bits() {
    let codec = codec(DEBUG, "IO", 500);
    let signal = codec.signal("distance").unwrap();

    let mut bytes = [0u8; 8];
    signal.encode(409.5, &mut bytes);
    let bits = bytes.view_bits::<Lsb0>();
    for (idx, bit) in bits.iter().enumerate() {
        assert_eq!(*bit, (20..32).contains(&idx), "bit {idx}");
    }
    assert_eq!(bits[20..32].load_le::<u16>(), 0xfff);
}

#[test]
fn neighbours_keep_their_bits() {
    let codec = codec(DEBUG, "IO", 500);
    let mut from = codec.new_group_store(None).unwrap();
    from.set("test_signed", DbcValue::I16(-2));
    from.set("test_unsigned", DbcValue::U8(0x5a));
    from.set("distance", DbcValue::F32(100.0));
    from.set("steer", DbcValue::I8(-3));
    from.set("drive", DbcValue::U8(7));
    from.set("temp", DbcValue::I16(20));

    let mut bytes = [0u8; 8];
    codec.encode(&from, &mut bytes);

    let bits = bytes.view_bits::<Lsb0>();
    assert_eq!(bits[0..8].load_le::<u8>(), 0xfe);
    assert_eq!(bits[8..16].load_le::<u8>(), 0x5a);
    assert_eq!(bits[16..20].load_le::<u8>(), 0);
    assert_eq!(bits[20..32].load_le::<u16>(), 1000);
    assert_eq!(bits[32..36].load_le::<u8>(), 0xd);
    assert_eq!(bits[36..40].load_le::<u8>(), 7);
    assert_eq!(bits[40..48].load_le::<u8>(), 60);

    let mut store = codec.new_store();
    assert!(codec.decode(&mut store, &bytes, None));
    let group = store.group(None).unwrap();
    assert_eq!(group.get("test_signed"), Some(DbcValue::I16(-2)));
    assert_eq!(group.get("test_unsigned"), Some(DbcValue::U8(0x5a)));
    assert_eq!(group.get("steer"), Some(DbcValue::I8(-3)));
    assert_eq!(group.get("temp"), Some(DbcValue::I16(20)));
}

#[test]
fn encode_clamps_declared_range() {
    let codec = codec(DEBUG, "IO", 500);

    let steer = codec.signal("steer").unwrap();
    assert_eq!(steer.to_raw(7.0), 5);
    assert_eq!(steer.to_raw(-7.0), 0xb);

    let drive = codec.signal("drive").unwrap();
    assert_eq!(drive.to_raw(12.0), 9);
    assert!(drive.clamp.unwrap().min.is_none());

    let temp = codec.signal("temp").unwrap();
    assert_eq!(temp.to_raw(-50.0), 0);
    assert_eq!(temp.to_raw(300.0), 255);
}

#[test]
fn header_mismatch_leaves_storage_untouched() {
    let codec = codec(HEARTBEAT, "MOTOR", 100);
    let mut store = codec.new_store();
    store.group_mut(None).unwrap().mia_info.mia_counter_ms = 40;
    let before = store.clone();

    let bytes = [0x05, 0, 0, 0, 0, 0, 0, 0];
    assert!(!codec.decode(&mut store, &bytes, Some(&MsgHdr { mid: 101, dlc: 1 })));
    assert!(!codec.decode(&mut store, &bytes, Some(&MsgHdr { mid: 100, dlc: 2 })));
    assert_eq!(store, before);
}

#[test]
fn mux_dispatch_updates_one_branch() {
    let codec = codec(SONARS, "SENSOR", 200);
    let mut from = codec.new_group_store(Some(1)).unwrap();
    assert!(from.set("err_count", DbcValue::U16(3)));
    assert!(from.set("no_filt_left", DbcValue::F32(1.5)));
    assert!(!from.set("left", DbcValue::F32(1.0)));

    let mut bytes = [0u8; 8];
    codec.encode(&from, &mut bytes);
    assert_eq!(bytes[0] & 0x0f, 1);

    let mut store = codec.new_store();
    for group in [Some(0), Some(1)] {
        store.group_mut(group).unwrap().mia_info.mia_counter_ms = 100;
    }
    assert!(codec.decode(&mut store, &bytes, None));

    let m1 = store.group(Some(1)).unwrap();
    assert_eq!(m1.get("err_count"), Some(DbcValue::U16(3)));
    assert_eq!(m1.get("no_filt_left"), Some(DbcValue::F32(1.5)));
    assert_eq!(m1.mia_info.mia_counter_ms, 0);

    let m0 = store.group(Some(0)).unwrap();
    assert_eq!(m0.get("left"), Some(DbcValue::F32(0.0)));
    assert_eq!(m0.get("err_count"), Some(DbcValue::U16(0)));
    assert_eq!(m0.mia_info.mia_counter_ms, 100);
}

#[test]
fn unknown_mux_index_is_rejected() {
    let codec = codec(SONARS, "DRIVER", 200);
    let mut store = codec.new_store();
    let before = store.clone();

    let bytes = [0x07, 0xff, 0xff, 0xff, 0, 0, 0, 0];
    assert!(!codec.decode(&mut store, &bytes, None));
    assert_eq!(store, before);
}

#[test]
fn mia_replaces_payload_once() {
    let codec = codec(HEARTBEAT, "MOTOR", 100);
    let mut default = codec.new_group_store(None).unwrap();
    default.set("cmd", DbcValue::U8(0xff));

    let mut store = codec.new_store();
    let bytes = [0x05, 0, 0, 0, 0, 0, 0, 0];
    assert!(codec.decode(&mut store, &bytes, None));

    let group = store.group_mut(None).unwrap();
    assert!(!handle_mia(group, &default, 300, 100));
    assert!(!handle_mia(group, &default, 300, 100));
    assert!(handle_mia(group, &default, 300, 100));
    assert_eq!(group.get("cmd"), Some(DbcValue::U8(0xff)));
    assert_eq!(group.mia_info, MiaInfo { is_mia: true, mia_counter_ms: 300 });
    assert!(!handle_mia(group, &default, 300, 100));

    // a fresh frame brings the message back
    assert!(codec.decode(&mut store, &bytes, None));
    let group = store.group(None).unwrap();
    assert_eq!(group.get("cmd"), Some(DbcValue::U8(5)));
    assert!(!group.mia_info.is_mia);
}
