//! Console plumbing shared by the slot and raw managers.
//!
//! The console itself (USB CDC, UART, whatever carries the bytes) lives
//! outside this crate. Managers see it as a [`Console`]: a line-oriented
//! sink with a single outstanding write. Command replies are always
//! attempted; asynchronous reports (`rcv`, `chan`) are built only when
//! the sink is free and are otherwise dropped, so a slow host can never
//! back-pressure the radio loop.
//!
//! The parsing helpers here mirror the console grammar: space-separated
//! tokens, case-insensitive hex payloads, and integers that accept an
//! optional `0x` prefix.

/// A line-oriented console sink with single-write occupancy.
pub trait Console {
    /// True while a previously started write has not completed.
    fn write_outstanding(&self) -> bool;

    /// Starts writing one line (terminator included by the caller).
    fn write_line(&mut self, line: &str);
}

/// Splits the next space-separated token off the front of `input`,
/// returning `(token, rest)`. Leading spaces are skipped; an exhausted
/// input yields empty tokens.
pub fn next_token(input: &str) -> (&str, &str) {
    let trimmed = input.trim_start_matches(' ');
    match trimmed.find(' ') {
        Some(split) => (&trimmed[..split], &trimmed[split + 1..]),
        None => (trimmed, ""),
    }
}

/// Decodes one hex digit.
pub fn parse_hex_nybble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Decodes a whole hex string into `out`, returning the byte count.
/// Fails on odd length, a non-hex digit, or overflowing `out`.
pub fn parse_hex_bytes(hex: &str, out: &mut [u8]) -> Option<usize> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let digits = hex.as_bytes();
    let count = digits.len() / 2;
    if count > out.len() {
        return None;
    }
    for (index, pair) in digits.chunks_exact(2).enumerate() {
        out[index] = (parse_hex_nybble(pair[0])? << 4) | parse_hex_nybble(pair[1])?;
    }
    Some(count)
}

/// Parses an unsigned integer, decimal by default, hex with a `0x`
/// prefix.
pub fn parse_int(token: &str) -> Option<u32> {
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else {
        token.parse::<u32>().ok()
    }
}
