//! Property-based tests for the STOMP frame codec and the JSON body codec.
//!
//! Uses proptest to verify:
//! 1. Arbitrary input never panics the frame decoder (returns `Err` or a frame).
//! 2. Header values with reserved characters survive escaping.
//! 3. Arbitrary input never panics the JSON body decoder.

use huddle_proto::codec;
use huddle_proto::stomp::{self, Command, Frame};
use proptest::prelude::*;

/// Header names are plain tokens; values may contain anything STOMP escapes.
fn arb_header() -> impl Strategy<Value = (String, String)> {
    ("[a-z][a-z-]{0,15}", "[^\x00]{0,32}")
        .prop_filter("content-length is managed by encode", |(name, _)| {
            name != "content-length"
        })
}

/// Bodies never contain NUL without a content-length, which `encode` always adds.
fn arb_body() -> impl Strategy<Value = String> {
    "[^\x00]{0,256}"
}

proptest! {
    #[test]
    fn decode_never_panics(input in ".{0,512}") {
        let _ = stomp::decode(&input);
    }

    #[test]
    fn decode_never_panics_on_frame_like_input(
        command in prop_oneof![Just("MESSAGE"), Just("SEND"), Just("CONNECTED"), Just("BOGUS")],
        lines in prop::collection::vec("[^\x00]{0,40}", 0..6),
        tail in "[\x00\n]{0,3}",
    ) {
        let input = format!("{command}\n{}\n{tail}", lines.join("\n"));
        let _ = stomp::decode(&input);
    }

    #[test]
    fn message_frames_survive_encode_decode(
        headers in prop::collection::vec(arb_header(), 0..6),
        body in arb_body(),
    ) {
        let mut frame = Frame::new(Command::Message).body(body);
        for (name, value) in headers {
            frame = frame.header(name, value);
        }
        let decoded = stomp::decode(&stomp::encode(&frame)).unwrap().unwrap();
        prop_assert_eq!(decoded.command, Command::Message);
        prop_assert_eq!(&decoded.body, &frame.body);
        for (name, value) in &frame.headers {
            prop_assert!(decoded.headers.contains(&(name.clone(), value.clone())));
        }
    }

    #[test]
    fn body_decode_never_panics(input in ".{0,256}") {
        let _ = codec::decode(&input);
    }
}
