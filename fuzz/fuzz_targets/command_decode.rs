//! Fuzz target for channel record decoding.
//!
//! Arbitrary bytes from the FIFO must decode or fail cleanly, and anything
//! that decodes must survive an encode/decode cycle.

#![no_main]

use clipocr::Command;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(command) = Command::decode(data) {
        let record = command.encode().expect("decoded command must encode");
        assert_eq!(record.iter().filter(|&&b| b == b'\n').count(), 1);
        assert_eq!(Command::decode(&record).ok(), Some(command));
    }
});
