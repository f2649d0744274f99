#![no_main]

use libfuzzer_sys::fuzz_target;
use tracehouse_core::varint::{self, Decoded};

fuzz_target!(|data: &[u8]| {
    // Decode arbitrary bytes in both directions. The decoders must never
    // read out of bounds, never panic, and fence instead of decoding
    // partial data. Non-minimal encodings are accepted, so we assert the
    // decoded value survives a write/read round trip rather than byte
    // equality.
    match varint::read(data) {
        Decoded::Value { value, len } => {
            assert!(value <= varint::MAX);
            assert!(len >= 1 && len <= 8 && len <= data.len());

            let mut buf = Vec::new();
            varint::write(value, &mut buf);
            assert_eq!(
                varint::read(&buf),
                Decoded::Value {
                    value,
                    len: buf.len()
                }
            );
        }
        Decoded::Flag => assert_eq!(data[0], 0),
        Decoded::Fence => {}
    }

    match varint::read_r(data) {
        Decoded::Value { value, len } => {
            assert!(value <= varint::MAX);
            assert!(len >= 1 && len <= 8 && len <= data.len());

            let mut buf = Vec::new();
            varint::write_r(value, &mut buf);
            assert_eq!(
                varint::read_r(&buf),
                Decoded::Value {
                    value,
                    len: buf.len()
                }
            );
        }
        Decoded::Flag => assert_eq!(*data.last().unwrap(), 0),
        Decoded::Fence => {}
    }

    // Walk the whole buffer forward, as the strata decoder does.
    let mut cursor = data;
    while let Decoded::Value { len, .. } = varint::read(cursor) {
        cursor = &cursor[len..];
    }
});
