#![no_main]
use libfuzzer_sys::fuzz_target;

use gcstream::framer::{CommandFramer, LINE_CAPACITY};

fuzz_target!(|data: &[u8]| {
    let Some((&flags, input)) = data.split_first() else {
        return;
    };
    let mut framer = CommandFramer::new(LINE_CAPACITY, flags & 1 == 1);
    for byte in input {
        if let Ok(Some(line)) = framer.push(*byte) {
            assert!(!line.is_empty());
            assert!(line.len() <= LINE_CAPACITY);
            assert!(!line.contains(&b'\r') && !line.contains(&b'\n'));
        }
    }
});
