#![no_main]
use libfuzzer_sys::fuzz_target;

use gcstream::scanner::{ReplyScanner, Token, CONFIRM_TOKEN, RESET_TOKEN};

fuzz_target!(|data: &[u8]| {
    let mut scanner = ReplyScanner::new();
    for (i, byte) in data.iter().enumerate() {
        let seen = &data[..=i];
        match scanner.feed(*byte) {
            Some(Token::Confirm) => assert!(seen.ends_with(CONFIRM_TOKEN)),
            Some(Token::Reset) => assert!(seen.ends_with(RESET_TOKEN)),
            None => assert!(!seen.ends_with(CONFIRM_TOKEN) && !seen.ends_with(RESET_TOKEN)),
        }
        assert!(scanner.confirm_cursor() < CONFIRM_TOKEN.len());
        assert!(scanner.reset_cursor() < RESET_TOKEN.len());
    }
});
