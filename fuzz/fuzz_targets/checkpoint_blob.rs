#![no_main]

use libfuzzer_sys::fuzz_target;
use tracehouse_core::{Instant, StrataVector};

fuzz_target!(|data: &[u8]| {
    // Checkpoint blobs come from a database that might be corrupt or
    // written by something else entirely. Decoding must reject garbage
    // cleanly - never panic, never read out of bounds.
    for num_strata in [0usize, 1, 4, 1024] {
        let _ = Instant::unpack(data, num_strata);
        let _ = StrataVector::unpack(data, num_strata);
    }

    // A blob that decodes must survive a repack/unpack round trip. (Byte
    // equality is not guaranteed: the varint decoder accepts non-minimal
    // encodings, while the packer always emits minimal ones.)
    if let Ok(instant) = Instant::unpack(data, 4) {
        let repacked = instant.pack().expect("decoded instant must repack");
        let reread = Instant::unpack(&repacked, 4).expect("repacked blob must decode");
        assert_eq!(reread, instant);
    }
});
