// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Message lines on endpoint stdout.
//!
//! Endpoints report traffic one message per line: `RECV <message>` for a
//! subscriber delivery, `REPLY <message>` for a reply a requester received.
//! Frames are separated by a tab. Inside a frame, backslash, newline,
//! carriage return, tab, other control bytes and bytes that are not valid
//! UTF-8 are escaped as `\\`, `\n`, `\r`, `\t` and `\xHH`. Plain text encodes
//! to itself.

use bytes::Bytes;

use crate::error::LineDecodeError;
use crate::harness::CapturedOutput;
use crate::message::Multipart;

/// Prefix of the line a subscriber endpoint prints per received message.
pub const RECV_MARKER: &str = "RECV ";

/// Prefix of the line a requester endpoint prints per received reply.
pub const REPLY_MARKER: &str = "REPLY ";

const FRAME_SEPARATOR: char = '\t';

/// Encode a message as a single line, without the marker.
pub fn encode(message: &Multipart) -> String {
    let mut line = String::new();
    for (index, frame) in message.frames().iter().enumerate() {
        if index > 0 {
            line.push(FRAME_SEPARATOR);
        }
        encode_frame(frame, &mut line);
    }
    line
}

fn encode_frame(frame: &[u8], out: &mut String) {
    match std::str::from_utf8(frame) {
        Ok(text) => {
            for c in text.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c if c.is_ascii_control() => push_hex(c as u8, out),
                    c => out.push(c),
                }
            }
        }
        Err(_) => {
            for &byte in frame {
                match byte {
                    b'\\' => out.push_str("\\\\"),
                    0x20..=0x7e => out.push(byte as char),
                    _ => push_hex(byte, out),
                }
            }
        }
    }
}

fn push_hex(byte: u8, out: &mut String) {
    out.push_str(&format!("\\x{:02x}", byte));
}

/// Decode a line produced by [`encode`]. Unescaped text decodes to itself.
pub fn decode(line: &str) -> Result<Multipart, LineDecodeError> {
    let frames = line
        .split(FRAME_SEPARATOR)
        .map(decode_frame)
        .collect::<Result<Vec<_>, _>>()?;
    // `split` yields at least one piece, so there is always a frame.
    Ok(Multipart::new(frames).unwrap_or_else(|_| Multipart::single(Bytes::new())))
}

fn decode_frame(text: &str) -> Result<Bytes, LineDecodeError> {
    let raw = text.as_bytes();
    let mut frame = Vec::with_capacity(raw.len());
    let mut offset = 0;
    while offset < raw.len() {
        let byte = raw[offset];
        if byte != b'\\' {
            frame.push(byte);
            offset += 1;
            continue;
        }
        let escape = *raw.get(offset + 1).ok_or(LineDecodeError::DanglingEscape)?;
        match escape {
            b'\\' => frame.push(b'\\'),
            b'n' => frame.push(b'\n'),
            b'r' => frame.push(b'\r'),
            b't' => frame.push(b'\t'),
            b'x' => {
                let digits = raw
                    .get(offset + 2..offset + 4)
                    .ok_or(LineDecodeError::DanglingEscape)?;
                let value = std::str::from_utf8(digits)
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or(LineDecodeError::InvalidHex { offset })?;
                frame.push(value);
                offset += 4;
                continue;
            }
            other => {
                return Err(LineDecodeError::UnknownEscape {
                    escape: other as char,
                    offset,
                })
            }
        }
        offset += 2;
    }
    Ok(Bytes::from(frame))
}

/// Messages reported under `marker`, in output order.
///
/// A line that fails to decode is kept as its raw text so that it still
/// takes part in (and fails) the comparison at its position.
pub fn reported(output: &CapturedOutput, marker: &str) -> Vec<Multipart> {
    output
        .stdout_lines()
        .into_iter()
        .filter_map(|line| line.strip_prefix(marker).map(str::to_string))
        .map(|text| match decode(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(marker = marker.trim_end(), error = %e, line = %text, "Undecodable message line");
                Multipart::from(text)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_unchanged() {
        let message = Multipart::from("ALERT: b");
        assert_eq!(encode(&message), "ALERT: b");
        assert_eq!(decode("ALERT: b").unwrap(), message);
    }

    #[test]
    fn test_newline_payload_stays_on_one_line() {
        let message = Multipart::from("first\nsecond\r\n");
        let line = encode(&message);
        assert!(!line.contains('\n'));
        assert!(!line.contains('\r'));
        assert_eq!(decode(&line).unwrap(), message);
    }

    #[test]
    fn test_frames_split_on_tab() {
        let message = Multipart::from_parts(["Echo: f1", "f\t2", ""]).unwrap();
        let line = encode(&message);
        assert_eq!(line, "Echo: f1\tf\\t2\t");
        let decoded = decode(&line).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_binary_and_control_bytes() {
        let message = Multipart::single(Bytes::from_static(b"\x01probe\xff\\"));
        let line = encode(&message);
        assert_eq!(line, "\\x01probe\\xff\\\\");
        assert_eq!(decode(&line).unwrap(), message);
    }

    #[test]
    fn test_utf8_text_is_not_escaped() {
        let message = Multipart::from("grüße");
        assert_eq!(encode(&message), "grüße");
    }

    #[test]
    fn test_empty_line_is_one_empty_frame() {
        let decoded = decode("").unwrap();
        assert_eq!(decoded.len(), 1);
        assert!(decoded.first().is_empty());
    }

    #[test]
    fn test_malformed_escapes() {
        assert_eq!(decode("abc\\"), Err(LineDecodeError::DanglingEscape));
        assert_eq!(decode("\\x4"), Err(LineDecodeError::DanglingEscape));
        assert_eq!(
            decode("a\\q"),
            Err(LineDecodeError::UnknownEscape {
                escape: 'q',
                offset: 1
            })
        );
        assert_eq!(decode("\\xzz"), Err(LineDecodeError::InvalidHex { offset: 0 }));
    }

    #[test]
    fn test_reported_keeps_undecodable_lines_in_place() {
        let output = CapturedOutput::default();
        output.push_stdout("READY");
        output.push_stdout("REPLY Echo: a\\nb");
        output.push_stdout("RECV ignored");
        output.push_stdout("REPLY bad\\q");

        let replies = reported(&output, REPLY_MARKER);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], Multipart::from("Echo: a\nb"));
        assert_eq!(replies[1], Multipart::from("bad\\q"));
    }
}
