//
// Copyright 2026 the Mudnet Authors. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Whole-codec negotiation behavior against adversarial input.

use bytes::BytesMut;
use mudnet_telnetcodec::consts::{self, option};
use mudnet_telnetcodec::{OptionPolicy, TelnetCodec, TelnetEvent};
use proptest::prelude::*;
use tokio_util::codec::Decoder;
use tracing_test::traced_test;

fn drain(codec: &mut TelnetCodec, bytes: &[u8]) -> Vec<TelnetEvent> {
    let mut src = BytesMut::from(bytes);
    let mut events = Vec::new();
    while let Some(event) = codec.decode(&mut src).unwrap() {
        events.push(event);
    }
    events
}

fn pending_len(codec: &mut TelnetCodec) -> usize {
    codec.take_pending().map(|b| b.len()).unwrap_or(0)
}

#[traced_test]
#[test]
fn full_client_greeting_settles() {
    let mut codec = TelnetCodec::new(OptionPolicy {
        allow_start_tls: false,
    });
    codec.offer_initial(false);
    let offered = pending_len(&mut codec);
    assert_eq!(offered, 7 * 3);

    // Client accepts everything we asked for and mirrors our offers.
    let wire = [
        consts::IAC, consts::WILL, option::TTYPE,
        consts::IAC, consts::WILL, option::NAWS,
        consts::IAC, consts::WILL, option::NEW_ENVIRON,
        consts::IAC, consts::WILL, option::CHARSET,
        consts::IAC, consts::DO, option::SGA,
        consts::IAC, consts::DO, option::EOR,
        consts::IAC, consts::DO, option::CHARSET,
    ];
    let events = drain(&mut codec, &wire);
    // Every acceptance settles an option; none may be re-answered.
    assert_eq!(events.len(), 7);
    assert_eq!(pending_len(&mut codec), 0);
}

#[test]
fn refusals_settle_silently() {
    let mut codec = TelnetCodec::default();
    codec.offer_initial(false);
    pending_len(&mut codec);

    let wire = [
        consts::IAC, consts::WONT, option::TTYPE,
        consts::IAC, consts::WONT, option::NAWS,
        consts::IAC, consts::DONT, option::SGA,
    ];
    let events = drain(&mut codec, &wire);
    assert!(events.is_empty(), "never-enabled refusals are not surfaced");
    assert_eq!(pending_len(&mut codec), 0);
}

proptest! {
    /// RFC 1143's loop-freedom bound: a burst of arbitrary negotiation
    /// commands never draws more than one three-byte reply per command,
    /// regardless of ordering or repetition.
    #[test]
    fn replies_bounded_by_commands(
        commands in prop::collection::vec(
            (251u8..=254, prop::num::u8::ANY),
            0..200,
        )
    ) {
        let mut codec = TelnetCodec::new(OptionPolicy { allow_start_tls: true });
        let mut wire = Vec::with_capacity(commands.len() * 3);
        for (verb, opt) in &commands {
            wire.extend([consts::IAC, *verb, *opt]);
        }
        drain(&mut codec, &wire);
        let replies = pending_len(&mut codec);
        prop_assert!(
            replies <= commands.len() * 3,
            "{} reply bytes for {} commands",
            replies,
            commands.len(),
        );
    }

    /// Repeating the same acknowledgement must go quiet after the first:
    /// a stuck client echoing WILL forever gets exactly one DO.
    #[test]
    fn repeated_will_for_supported_option_draws_one_reply(
        opt in prop::sample::select(vec![
            option::SGA,
            option::TTYPE,
            option::NAWS,
            option::NEW_ENVIRON,
            option::CHARSET,
            option::BINARY,
        ]),
        times in 2usize..50,
    ) {
        let mut codec = TelnetCodec::default();
        let mut wire = Vec::new();
        for _ in 0..times {
            wire.extend([consts::IAC, consts::WILL, opt]);
        }
        drain(&mut codec, &wire);
        let replies = pending_len(&mut codec);
        prop_assert!(replies <= 3, "{replies} reply bytes for repeated WILL {opt}");
    }

    /// Arbitrary bytes never panic the decoder or wedge its state machine.
    #[test]
    fn decoder_survives_garbage(data in prop::collection::vec(prop::num::u8::ANY, 0..512)) {
        let mut codec = TelnetCodec::default();
        drain(&mut codec, &data);
        // A plain line still decodes afterwards, whatever state the
        // garbage left behind.
        let events = drain(&mut codec, b"\xff\xf0\xff\xf0ok\r\n");
        prop_assert!(!events.is_empty());
    }
}
