//! Terminal output sanitization.
//!
//! Turns raw pty bytes into plain text, in this order:
//! 1. escape sequences (single-character, CSI, OSC) are removed
//! 2. invalid UTF-8 is replaced, never rejected
//! 3. CRLF and bare CR become LF
//! 4. leaked shell-integration fragments (`133;X;...BEL`) are removed
//! 5. remaining control characters other than LF and TAB are dropped
//!
//! Every call rescans its whole input. Callers pass the full accumulated
//! buffer, so a sequence split across two reads is never seen half-way once
//! the rest of it arrives.

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// Prefix of the shell-integration marker that sometimes leaks without its
/// `ESC ]` wrapper, e.g. `133;A;cl=m;aid=42\x07`.
const FRAGMENT_PREFIX: &str = "133;";

/// Convert raw terminal output into clean text. Never fails.
pub fn sanitize(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let stripped = strip_escapes(raw);
    let text = String::from_utf8_lossy(&stripped);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = strip_integration_fragments(&text);

    text.chars()
        .filter(|&ch| ch == '\n' || ch == '\t' || !ch.is_control())
        .collect()
}

fn strip_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while let Some(byte) = raw.get(i).copied() {
        if byte == ESC {
            i = skip_escape(raw, i + 1);
        } else {
            out.push(byte);
            i += 1;
        }
    }
    out
}

/// Returns the index just past the sequence introduced by the ESC at `start - 1`.
fn skip_escape(raw: &[u8], start: usize) -> usize {
    match raw.get(start).copied() {
        Some(b'[') => skip_csi(raw, start + 1),
        Some(b']') => skip_osc(raw, start + 1),
        // Charset designation and friends: ESC ( B
        Some(0x20..=0x2f) => skip_final(raw, start + 1),
        Some(0x30..=0x7e) => start + 1,
        // Lone ESC, or ESC before a control/non-ASCII byte: only the ESC goes.
        _ => start,
    }
}

/// CSI: parameter bytes, intermediate bytes, one final byte.
fn skip_csi(raw: &[u8], mut i: usize) -> usize {
    while let Some(0x30..=0x3f) = raw.get(i).copied() {
        i += 1;
    }
    while let Some(0x20..=0x2f) = raw.get(i).copied() {
        i += 1;
    }
    match raw.get(i).copied() {
        Some(0x40..=0x7e) => i + 1,
        // Malformed or cut short: drop what was consumed, resume at the offending byte.
        _ => i,
    }
}

/// OSC: ends at BEL or ST (`ESC \`). Any other ESC aborts it and starts a new
/// sequence; end of input counts as a terminator.
fn skip_osc(raw: &[u8], mut i: usize) -> usize {
    while let Some(byte) = raw.get(i).copied() {
        match byte {
            BEL => return i + 1,
            ESC if raw.get(i + 1).copied() == Some(b'\\') => return i + 2,
            ESC => return i,
            _ => i += 1,
        }
    }
    i
}

fn skip_final(raw: &[u8], mut i: usize) -> usize {
    while let Some(0x20..=0x2f) = raw.get(i).copied() {
        i += 1;
    }
    match raw.get(i).copied() {
        Some(0x30..=0x7e) => i + 1,
        _ => i,
    }
}

/// Remove `133;<A-Z>;...BEL` where the body does not cross a line break.
fn strip_integration_fragments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(FRAGMENT_PREFIX) {
        match fragment_len(&rest[pos..]) {
            Some(len) => {
                out.push_str(&rest[..pos]);
                rest = &rest[pos + len..];
            }
            None => {
                let skip = pos + FRAGMENT_PREFIX.len();
                out.push_str(&rest[..skip]);
                rest = &rest[skip..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn fragment_len(candidate: &str) -> Option<usize> {
    let bytes = candidate.as_bytes();
    let kind = *bytes.get(FRAGMENT_PREFIX.len())?;
    let separator = *bytes.get(FRAGMENT_PREFIX.len() + 1)?;
    if !kind.is_ascii_uppercase() || separator != b';' {
        return None;
    }

    let body_start = FRAGMENT_PREFIX.len() + 2;
    let body = &candidate[body_start..];
    let end = body.find(['\u{7}', '\n'])?;
    (body.as_bytes()[end] == BEL).then_some(body_start + end + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_csi_sequences() {
        assert_eq!(sanitize(b"\x1b[31mRed\x1b[0m plain"), "Red plain");
        assert_eq!(sanitize(b"Line 1\x1b[2J\x1b[HCleared"), "Line 1Cleared");
        assert_eq!(sanitize(b"\x1b[?2004hprompt\x1b[?2004l"), "prompt");
    }

    #[test]
    fn test_strips_osc_with_either_terminator() {
        assert_eq!(sanitize(b"Before\x1b]7;file://host/path\x07After"), "BeforeAfter");
        assert_eq!(sanitize(b"a\x1b]0;title\x1b\\b"), "ab");
        assert_eq!(sanitize(b"\x1b]133;A\x07$ "), "$ ");
    }

    #[test]
    fn test_unterminated_osc_runs_to_end_of_input() {
        assert_eq!(sanitize(b"ok\x1b]0;never closed"), "ok");
    }

    #[test]
    fn test_osc_aborted_by_new_escape() {
        assert_eq!(sanitize(b"\x1b]0;title\x1b[1mbold"), "bold");
    }

    #[test]
    fn test_strips_single_character_and_charset_escapes() {
        assert_eq!(sanitize(b"\x1b=\x1b>x\x1b7y\x1b8"), "xy");
        assert_eq!(sanitize(b"\x1b(Bplain"), "plain");
        assert_eq!(sanitize(b"\x1bMup"), "up");
    }

    #[test]
    fn test_lone_escape_is_dropped() {
        assert_eq!(sanitize(b"tail\x1b"), "tail");
        assert_eq!(sanitize(b"\x1b\x1b[0mz"), "z");
    }

    #[test]
    fn test_malformed_csi_keeps_following_text() {
        // 0x07 is not a valid CSI byte; the sequence ends there and BEL is dropped later.
        assert_eq!(sanitize(b"\x1b[12\x07rest"), "rest");
    }

    #[test]
    fn test_normalizes_line_endings() {
        assert_eq!(sanitize(b"a\r\nb\rc\n"), "a\nb\nc\n");
        assert_eq!(sanitize(b"echo hi\r\nhi\r\n$ "), "echo hi\nhi\n$ ");
    }

    #[test]
    fn test_removes_leaked_integration_fragments() {
        assert_eq!(sanitize(b"133;A;cl=m;aid=7\x07$ "), "$ ");
        assert_eq!(sanitize(b"x133;D;0\x07y"), "xy");
    }

    #[test]
    fn test_keeps_non_matching_integration_text() {
        // Lowercase kind, and a body that crosses a newline, are left alone
        // (the BEL itself still goes as a control character).
        assert_eq!(sanitize(b"133;a;x\x07"), "133;a;x");
        assert_eq!(sanitize(b"133;A;x\ny\x07"), "133;A;x\ny");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        assert_eq!(sanitize(&[b'o', b'k', 0xff]), "ok\u{FFFD}");
        assert_eq!(sanitize("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn test_drops_control_characters_except_newline_and_tab() {
        assert_eq!(sanitize(b"a\x00b\x08c\td\x7f\n"), "abc\td\n");
        assert_eq!(sanitize("x\u{85}y".as_bytes()), "xy");
    }

    #[test]
    fn test_no_escape_byte_survives() {
        let inputs: [&[u8]; 5] = [
            b"\x1b[1;32mgreen\x1b[0m",
            b"\x1b]0;t\x07\x1b[K",
            b"\x1b",
            b"\x1b[",
            b"\x1b\x1b\x1b]",
        ];
        for input in inputs {
            assert!(!sanitize(input).contains('\x1b'), "escape left in {input:?}");
        }
    }

    #[test]
    fn test_idempotent() {
        let inputs: [&[u8]; 4] = [
            b"\x1b[31mred\x1b[0m\r\nnext\r",
            b"133;A;x\x07\x1b]7;file:///\x07$ ",
            &[0xe2, 0x82, b'\r', 0x1b, b'[', b'2', b'J'],
            b"plain text\twith tab\n",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(once.as_bytes()), once);
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitize(b""), "");
    }
}
