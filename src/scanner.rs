/// Sent by the device after it has processed a command.
pub const CONFIRM_TOKEN: &[u8] = b"ok\r\n";
/// Sent by the device once after (re)booting.
pub const RESET_TOKEN: &[u8] = b"start\r\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    Confirm,
    Reset,
}

/// TokenMatcher finds occurrences of a fixed byte string in a stream that
/// arrives in arbitrary fragments. There's no framing guarantee on the reply
/// channel: a token may straddle two reads, and may be preceded or followed by
/// arbitrary diagnostic output from the firmware.
#[derive(Clone, Debug)]
pub struct TokenMatcher {
    token: &'static [u8],
    // fallback[i] is the length of the longest proper prefix of token[..=i]
    // that is also a suffix of it. Both protocol tokens have an all-zero table,
    // but computing it costs nothing and keeps arbitrary tokens correct.
    fallback: Vec<usize>,
    cursor: usize,
}

impl TokenMatcher {
    pub fn new(token: &'static [u8]) -> TokenMatcher {
        assert!(!token.is_empty(), "cannot match an empty token");
        let mut fallback = vec![0; token.len()];
        let mut k = 0;
        for i in 1..token.len() {
            while k > 0 && token[i] != token[k] {
                k = fallback[k - 1];
            }
            if token[i] == token[k] {
                k += 1;
            }
            fallback[i] = k;
        }
        TokenMatcher {
            token,
            fallback,
            cursor: 0,
        }
    }

    /// Feed the next byte, returns true if it completed the token. The cursor
    /// is reset afterwards, so back-to-back tokens in one chunk are all seen.
    pub fn advance(&mut self, byte: u8) -> bool {
        // A mismatch drops the current progress, but the byte itself may still
        // start (or continue) a shorter match - e.g. "ook\r\n" must not hide the
        // "ok\r\n" at its tail.
        while self.cursor > 0 && self.token[self.cursor] != byte {
            self.cursor = self.fallback[self.cursor - 1];
        }
        if self.token[self.cursor] == byte {
            self.cursor += 1;
        }
        if self.cursor == self.token.len() {
            self.cursor = 0;
            return true;
        }
        false
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// ReplyScanner runs the confirmation and reset matchers side by side over
/// the device's output. Each keeps its own cursor: partial progress on one
/// token says nothing about the other.
#[derive(Clone, Debug)]
pub struct ReplyScanner {
    confirm: TokenMatcher,
    reset: TokenMatcher,
}

impl Default for ReplyScanner {
    fn default() -> Self {
        ReplyScanner::new()
    }
}

impl ReplyScanner {
    pub fn new() -> ReplyScanner {
        ReplyScanner {
            confirm: TokenMatcher::new(CONFIRM_TOKEN),
            reset: TokenMatcher::new(RESET_TOKEN),
        }
    }

    pub fn feed(&mut self, byte: u8) -> Option<Token> {
        // Both matchers must see every byte, so don't short-circuit.
        let confirmed = self.confirm.advance(byte);
        let reset = self.reset.advance(byte);
        match (confirmed, reset) {
            (true, _) => Some(Token::Confirm),
            (false, true) => Some(Token::Reset),
            (false, false) => None,
        }
    }

    /// Scan a whole chunk, returning every token completed within it in order.
    pub fn scan(&mut self, chunk: &[u8]) -> Vec<Token> {
        chunk.iter().filter_map(|&byte| self.feed(byte)).collect()
    }

    pub fn confirm_cursor(&self) -> usize {
        self.confirm.cursor()
    }

    pub fn reset_cursor(&self) -> usize {
        self.reset.cursor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan() {
        struct TestCase<'a> {
            name: &'a str,
            chunks: &'a [&'a [u8]],
            expected: &'a [Token],
        }
        let tests = [
            TestCase {
                name: "Empty",
                chunks: &[b""],
                expected: &[],
            },
            TestCase {
                name: "SingleConfirm",
                chunks: &[b"ok\r\n"],
                expected: &[Token::Confirm],
            },
            TestCase {
                name: "SingleReset",
                chunks: &[b"start\r\n"],
                expected: &[Token::Reset],
            },
            TestCase {
                name: "ConfirmSplitAcrossReads",
                chunks: &[b"o", b"k\r", b"\n"],
                expected: &[Token::Confirm],
            },
            TestCase {
                name: "ResetSplitAcrossReads",
                chunks: &[b"sta", b"rt\r\n"],
                expected: &[Token::Reset],
            },
            TestCase {
                name: "BackToBackConfirms",
                chunks: &[b"ok\r\nok\r\nok\r\n"],
                expected: &[Token::Confirm, Token::Confirm, Token::Confirm],
            },
            TestCase {
                name: "ResetThenConfirm",
                chunks: &[b"start\r\nok\r\n"],
                expected: &[Token::Reset, Token::Confirm],
            },
            TestCase {
                name: "DiagnosticNoise",
                chunks: &[b"echo: busy\r\nok\r\n// T:21.3 /0.0\r\n"],
                expected: &[Token::Confirm],
            },
            TestCase {
                name: "MissingLineFeed",
                chunks: &[b"ok\rok\r\n"],
                expected: &[Token::Confirm],
            },
            TestCase {
                name: "UpperCaseIsNotAToken",
                chunks: &[b"OK\r\nSTART\r\n"],
                expected: &[],
            },
            TestCase {
                name: "RepeatedFirstByte",
                chunks: &[b"ook\r\n"],
                expected: &[Token::Confirm],
            },
            TestCase {
                name: "ResetInterruptedByConfirm",
                // The reset cursor is dropped by the 'o', the confirmation
                // is still found.
                chunks: &[b"staok\r\n"],
                expected: &[Token::Confirm],
            },
            TestCase {
                name: "FalseStartThenReset",
                chunks: &[b"ssta", b"start\r\n"],
                expected: &[Token::Reset],
            },
            TestCase {
                name: "OkInsideOtherText",
                // Firmware that prints "ok" mid-line doesn't confirm anything,
                // only the full token with its terminator does.
                chunks: &[b"look ok?\r\n"],
                expected: &[],
            },
        ];
        for case in tests {
            let mut scanner = ReplyScanner::new();
            let got: Vec<Token> = case
                .chunks
                .iter()
                .flat_map(|chunk| scanner.scan(chunk))
                .collect();
            assert_eq!(
                got, case.expected,
                "{}: got={got:?}, want={:?}",
                case.name, case.expected
            );
        }
    }

    #[test]
    fn test_cursors_are_independent() {
        let mut scanner = ReplyScanner::new();
        assert_eq!(None, scanner.feed(b's'));
        assert_eq!(1, scanner.reset_cursor());
        assert_eq!(0, scanner.confirm_cursor());
        // 'o' drops the reset progress, and starts a confirmation.
        assert_eq!(None, scanner.feed(b'o'));
        assert_eq!(0, scanner.reset_cursor());
        assert_eq!(1, scanner.confirm_cursor());
        for byte in b"start\r" {
            scanner.feed(*byte);
        }
        assert_eq!(6, scanner.reset_cursor());
        assert_eq!(0, scanner.confirm_cursor());
        assert_eq!(Some(Token::Reset), scanner.feed(b'\n'));
        assert_eq!(0, scanner.reset_cursor());
    }

    #[test]
    fn test_mismatch_resets_progress() {
        let mut matcher = TokenMatcher::new(RESET_TOKEN);
        for byte in b"star" {
            assert!(!matcher.advance(*byte));
        }
        assert_eq!(4, matcher.cursor());
        assert!(!matcher.advance(b'x'));
        assert_eq!(0, matcher.cursor());
    }

    #[test]
    fn test_completes_iff_suffix_matches() {
        // Exhaustively check every sequence over a small alphabet that's rich
        // in token bytes: the matcher must fire exactly when the stream ends
        // in the token.
        let alphabet = b"okst\r\nx";
        for token in [CONFIRM_TOKEN, RESET_TOKEN] {
            let len = 6;
            let mut indexes = vec![0usize; len];
            loop {
                let stream: Vec<u8> = indexes.iter().map(|&i| alphabet[i]).collect();
                let mut matcher = TokenMatcher::new(token);
                // Only the final byte is checked: matches earlier in the stream
                // reset the cursor, which is fine because the token can't
                // overlap itself.
                let mut fired = false;
                for (i, byte) in stream.iter().enumerate() {
                    let completed = matcher.advance(*byte);
                    if i == stream.len() - 1 {
                        fired = completed;
                    }
                }
                assert_eq!(
                    fired,
                    stream.ends_with(token),
                    "stream={stream:?} token={token:?}"
                );

                let mut pos = 0;
                while pos < len {
                    indexes[pos] += 1;
                    if indexes[pos] < alphabet.len() {
                        break;
                    }
                    indexes[pos] = 0;
                    pos += 1;
                }
                if pos == len {
                    break;
                }
            }
        }
    }

    #[test]
    fn test_self_overlapping_token() {
        let mut matcher = TokenMatcher::new(b"aab");
        let completions: Vec<bool> = b"aaab".iter().map(|b| matcher.advance(*b)).collect();
        assert_eq!(vec![false, false, false, true], completions);
    }
}
