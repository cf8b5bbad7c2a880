use crate::error::FrameError;

/// The G-code standard limits blocks to 256 characters, but some senders
/// emit longer lines (e.g. long comments when compression is off). Firmware
/// has its own ceiling anyway, so anything above this is certainly broken.
pub const LINE_CAPACITY: usize = 512;

/// CommandFramer splits the command source into lines, one byte at a time.
///
/// Lines end at either '\r' or '\n' (so "\r\n" files work, and produce no
/// empty commands). With compression enabled, spaces and tabs are dropped
/// and ';' comments are stripped; this is optional because some firmware
/// interprets comments itself and shouldn't have them mangled.
#[derive(Clone, Debug)]
pub struct CommandFramer {
    line: Vec<u8>,
    capacity: usize,
    compress: bool,
    in_comment: bool,
}

impl CommandFramer {
    pub fn new(capacity: usize, compress: bool) -> CommandFramer {
        CommandFramer {
            line: Vec::with_capacity(capacity),
            capacity,
            compress,
            in_comment: false,
        }
    }

    /// Feed the next input byte. Returns the completed line (without
    /// terminator) when `byte` ends a non-empty line.
    /// Lines longer than the capacity are rejected outright rather than
    /// truncated: a truncated move is worse than no move at all.
    pub fn push(&mut self, byte: u8) -> Result<Option<Vec<u8>>, FrameError> {
        match byte {
            b'\r' | b'\n' => {
                self.in_comment = false;
                if self.line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.line)));
            }
            b';' if self.compress => {
                self.in_comment = true;
                return Ok(None);
            }
            b' ' | b'\t' if self.compress => return Ok(None),
            _ if self.in_comment => return Ok(None),
            _ => (),
        }

        if self.line.len() >= self.capacity {
            self.line.clear();
            self.in_comment = false;
            return Err(FrameError::LineTooLong {
                capacity: self.capacity,
            });
        }
        self.line.push(byte);
        Ok(None)
    }

    /// Called once the command source is exhausted: returns whatever was
    /// accumulated after the last terminator, so that a file without a
    /// trailing newline doesn't lose its final command.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.in_comment = false;
        if self.line.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.line))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_all(framer: &mut CommandFramer, input: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        let mut lines = Vec::new();
        for byte in input {
            if let Some(line) = framer.push(*byte)? {
                lines.push(line);
            }
        }
        if let Some(line) = framer.finish() {
            lines.push(line);
        }
        Ok(lines)
    }

    #[test]
    fn test_framing() {
        struct TestCase<'a> {
            name: &'a str,
            input: &'a [u8],
            compress: bool,
            expected: &'a [&'a [u8]],
        }
        let tests = [
            TestCase {
                name: "Empty",
                input: b"",
                compress: false,
                expected: &[],
            },
            TestCase {
                name: "TwoLines",
                input: b"G1 X10\nG1 X20\n",
                compress: false,
                expected: &[b"G1 X10", b"G1 X20"],
            },
            TestCase {
                name: "CrLf",
                input: b"G28\r\nM104 S200\r\n",
                compress: false,
                expected: &[b"G28", b"M104 S200"],
            },
            TestCase {
                name: "BlankLinesSkipped",
                input: b"\n\n\r\nG28\n\n",
                compress: false,
                expected: &[b"G28"],
            },
            TestCase {
                name: "NoTrailingNewline",
                input: b"G28\nG1 X1",
                compress: false,
                expected: &[b"G28", b"G1 X1"],
            },
            TestCase {
                name: "CompressedComment",
                input: b"  G1 X10 ; comment\n",
                compress: true,
                expected: &[b"G1X10"],
            },
            TestCase {
                name: "UncompressedComment",
                input: b"  G1 X10 ; comment\n",
                compress: false,
                expected: &[b"  G1 X10 ; comment"],
            },
            TestCase {
                name: "CompressedTabs",
                input: b"G1\tX1\tY2\n",
                compress: true,
                expected: &[b"G1X1Y2"],
            },
            TestCase {
                name: "CommentOnlyLineSkipped",
                input: b"; header\nG28\n",
                compress: true,
                expected: &[b"G28"],
            },
            TestCase {
                name: "CommentEndsAtCarriageReturn",
                input: b"G28 ;home\rG1 X1\n",
                compress: true,
                expected: &[b"G28", b"G1X1"],
            },
            TestCase {
                name: "CommentAtEndOfInput",
                input: b"G28 ; no newline",
                compress: true,
                expected: &[b"G28"],
            },
        ];
        for case in tests {
            let mut framer = CommandFramer::new(LINE_CAPACITY, case.compress);
            let got = frame_all(&mut framer, case.input).unwrap();
            let expected: Vec<Vec<u8>> = case.expected.iter().map(|l| l.to_vec()).collect();
            assert_eq!(
                got, expected,
                "{}: got={got:?}, want={expected:?}",
                case.name
            );
        }
    }

    #[test]
    fn test_line_too_long() {
        let mut framer = CommandFramer::new(4, false);
        for byte in b"G281" {
            assert_eq!(Ok(None), framer.push(*byte));
        }
        assert_eq!(Err(FrameError::LineTooLong { capacity: 4 }), framer.push(b'0'));
        // The overlong line is discarded, not carried into the next one.
        assert_eq!(Ok(None), framer.push(b'\n'));
        assert_eq!(None, framer.finish());
    }

    #[test]
    fn test_capacity_counts_transmitted_bytes() {
        // Compressed-away bytes don't count towards the limit.
        let mut framer = CommandFramer::new(4, true);
        let lines = frame_all(&mut framer, b"G 2 8 1 ; a long comment\n").unwrap();
        assert_eq!(vec![b"G281".to_vec()], lines);
    }
}
