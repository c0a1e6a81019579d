//! Fuzz target for config file parsing.
//!
//! Any text must parse without panicking.

#![no_main]

use clipocr::Config;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Only process valid UTF-8 strings
    if let Ok(s) = std::str::from_utf8(data) {
        let config = Config::parse(s);
        if let Some(args) = &config.clip_args {
            assert!(!args.is_empty());
        }
    }
});
