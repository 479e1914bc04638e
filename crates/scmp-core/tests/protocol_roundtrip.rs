//! Integration tests for the scmp-core protocol codec and framer.
//!
//! These tests drive the public API the way the debugger engine does: bytes
//! arrive in arbitrary chunks, the first message fixes the byte order, and every
//! later message is decoded under that order.

use scmp_core::{
    decode_message, encode_message,
    protocol::{Endianness, Framer, FramingError},
    BreakpointRef, ProtocolVersion, ScmpMessage,
};

const ORDERS: [Endianness; 2] = [Endianness::Little, Endianness::Big];

/// Encodes a message and then decodes it under the same order.
fn roundtrip(msg: &ScmpMessage, order: Endianness) -> ScmpMessage {
    let bytes = encode_message(msg, order).expect("encode must succeed");
    let (decoded, consumed) = decode_message(&bytes, order).expect("decode must succeed");
    assert_eq!(consumed, bytes.len(), "all bytes must be consumed");
    decoded
}

fn sample_messages() -> Vec<ScmpMessage> {
    vec![
        ScmpMessage::Endianness,
        ScmpMessage::Version(ProtocolVersion::new(5, 0)),
        ScmpMessage::Success,
        ScmpMessage::Failure,
        ScmpMessage::Authenticated,
        ScmpMessage::PluginsReady,
        ScmpMessage::Ready,
        ScmpMessage::Disconnect,
        ScmpMessage::DebugStart,
        ScmpMessage::DebugStop,
        ScmpMessage::StepInto,
        ScmpMessage::StepOver,
        ScmpMessage::StepOut,
        ScmpMessage::BreakpointBegin(BreakpointRef {
            plugin_id: 7,
            relative_file_path: "ui/Menu.lua".to_string(),
            line: 1234,
        }),
        ScmpMessage::BreakpointSync(vec![0, 1, 2, 3, 255]),
        ScmpMessage::BreakpointEnd(Vec::new()),
        ScmpMessage::BreakpointContinue,
        ScmpMessage::Data {
            type_code: 0x0400,
            payload: b"locals".to_vec(),
        },
    ]
}

#[test]
fn test_roundtrip_every_message_under_both_orders() {
    for order in ORDERS {
        for msg in sample_messages() {
            assert_eq!(roundtrip(&msg, order), msg, "{msg:?} under {order:?}");
        }
    }
}

#[test]
fn test_numeric_fields_differ_on_the_wire_between_orders() {
    let msg = ScmpMessage::Version(ProtocolVersion::new(5, 1));
    let little = encode_message(&msg, Endianness::Little).unwrap();
    let big = encode_message(&msg, Endianness::Big).unwrap();
    assert_ne!(little, big);
    assert_eq!(&little[4..], &[5, 0, 1, 0]);
    assert_eq!(&big[4..], &[0, 5, 0, 1]);
}

#[test]
fn test_framer_single_byte_delivery_yields_each_message_once() {
    for order in ORDERS {
        // Arrange
        let mut stream = encode_message(&ScmpMessage::Endianness, order).unwrap();
        for msg in sample_messages().iter().skip(1) {
            stream.extend(encode_message(msg, order).unwrap());
        }
        let mut framer = Framer::new();
        let mut decoded = Vec::new();

        // Act: deliver one byte at a time.
        for byte in &stream {
            framer.push(std::slice::from_ref(byte)).unwrap();
            while let Some(frame) = framer.next_frame().unwrap() {
                decoded.push(frame.decode(framer.order()).unwrap());
            }
        }

        // Assert
        assert_eq!(framer.order(), order);
        assert_eq!(decoded, sample_messages());
    }
}

#[test]
fn test_framer_locks_order_for_rest_of_session() {
    // Arrange: big-endian session.
    let mut framer = Framer::new();
    framer
        .push(&encode_message(&ScmpMessage::Endianness, Endianness::Big).unwrap())
        .unwrap();
    framer.next_frame().unwrap();

    // Act: a second announcement arrives mid-session, then a version.
    framer
        .push(&encode_message(&ScmpMessage::Endianness, Endianness::Big).unwrap())
        .unwrap();
    framer
        .push(&encode_message(&ScmpMessage::Version(ProtocolVersion::new(4, 2)), Endianness::Big).unwrap())
        .unwrap();
    let mut frames = Vec::new();
    while let Some(frame) = framer.next_frame().unwrap() {
        frames.push(frame);
    }

    // Assert: the version still decodes correctly under big-endian.
    assert_eq!(framer.order(), Endianness::Big);
    assert_eq!(
        frames.last().unwrap().decode(framer.order()).unwrap(),
        ScmpMessage::Version(ProtocolVersion::new(4, 2))
    );
}

#[test]
fn test_framer_overflow_is_reported_and_buffer_preserved() {
    let mut framer = Framer::new();
    framer.push(&[0u8; 4000]).unwrap();

    let err = framer.push(&[0u8; 200]).unwrap_err();

    assert_eq!(err.capacity, 4096);
    assert_eq!(framer.buffered(), 4000);
    assert!(matches!(
        FramingError::from(err),
        FramingError::Overflow(_)
    ));
}
