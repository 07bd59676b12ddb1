//! Percent-escape decoding for `LOG=` values.
//!
//! There is no error path: malformed input just produces a shorter result.
//! Output is limited to printable 7-bit ASCII, so it is always valid UTF-8
//! and can never smuggle a line break into a log stream.

use crate::http::MAX_REQUEST_LINE;

pub type Decoded = heapless::Vec<u8, MAX_REQUEST_LINE>;

/// Hard stop for the decode loop, independent of the input length.
const STEP_LIMIT: usize = MAX_REQUEST_LINE + 16;

pub fn percent_decode(input: &[u8]) -> Decoded {
    let mut out = Decoded::new();
    let mut i = 0;
    let mut steps = 0;

    while i < input.len() && steps < STEP_LIMIT {
        steps += 1;

        let byte = if input[i] == b'%' {
            // An escape cut off by the end of input ends decoding.
            let (Some(&hi), Some(&lo)) = (input.get(i + 1), input.get(i + 2)) else {
                break;
            };
            i += 3;
            match (hex_value(hi), hex_value(lo)) {
                (Some(hi), Some(lo)) => ((hi << 4) | lo) & 0x7F,
                _ => continue,
            }
        } else {
            i += 1;
            input[i - 1]
        };

        if is_printable(byte) && out.push(byte).is_err() {
            break;
        }
    }

    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn is_printable(b: u8) -> bool {
    (0x20..=0x7E).contains(&b)
}

// ===========================================================================
// Tests
// ===========================================================================
