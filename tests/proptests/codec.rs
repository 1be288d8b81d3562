// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Codec properties: any field values survive the wire, and no byte
//! string makes `decode` panic.

use multicast_tester::codec::{decode, encode, DecodeError, MessageKind, MESSAGE_SIZE};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_round_trip(timestamp in any::<i64>(), sequence in any::<u64>(), kind in any::<u16>()) {
        let bytes = encode(timestamp, sequence, MessageKind::from(kind));
        let message = decode(&bytes).unwrap();

        prop_assert_eq!(message.timestamp, timestamp);
        prop_assert_eq!(message.sequence, sequence);
        prop_assert_eq!(u16::from(message.kind), kind);
    }

    #[test]
    fn test_decode_never_panics(input in proptest::collection::vec(any::<u8>(), 0..64)) {
        match decode(&input) {
            Ok(_) => prop_assert!(input.len() >= MESSAGE_SIZE),
            Err(DecodeError::TooShort { actual, .. }) => {
                prop_assert!(input.len() < MESSAGE_SIZE);
                prop_assert_eq!(actual, input.len());
            }
        }
    }

    #[test]
    fn test_trailing_bytes_are_ignored(
        sequence in any::<u64>(),
        trailer in proptest::collection::vec(any::<u8>(), 0..32),
    ) {
        let mut bytes = encode(7, sequence, MessageKind::Test).to_vec();
        bytes.extend_from_slice(&trailer);

        let message = decode(&bytes).unwrap();
        prop_assert_eq!(message.sequence, sequence);
        prop_assert_eq!(message.kind, MessageKind::Test);
    }
}
