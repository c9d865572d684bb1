// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Incremental RESP decoder.
//!
//! Unlike a decoder written against a whole in-memory message, this one is
//! built to run against a growing socket read buffer: every parse step
//! reports how many bytes it would need past the end of the slice instead of
//! indexing out of bounds, so a caller can keep accumulating reads until a
//! full command is available.

use crate::error::{KvError, KvResult};

/// Result of attempting to parse one RESP command out of a buffer.
pub enum Decoded {
    /// A full command was parsed; `consumed` bytes should be dropped from
    /// the front of the read buffer.
    Complete { command: Vec<String>, consumed: usize },
    /// Not enough bytes yet; the caller should read more and retry.
    Incomplete,
}

/// Parses one RESP command (an array of bulk strings) from the front of
/// `buf`. Any other top-level RESP type is a protocol error, since the wire
/// contract only ever sends commands this way.
pub fn try_parse_command(buf: &[u8]) -> KvResult<Decoded> {
    if buf.is_empty() {
        return Ok(Decoded::Incomplete);
    }
    if buf[0] != b'*' {
        return Err(KvError::Protocol("expected command array".into()));
    }
    match parse_value(buf)? {
        None => Ok(Decoded::Incomplete),
        Some((Value::Array(items), consumed)) => {
            let mut command = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Bulk(s) => command.push(s),
                    _ => {
                        return Err(KvError::Protocol(
                            "command array must contain only bulk strings".into(),
                        ))
                    }
                }
            }
            if command.is_empty() {
                return Err(KvError::Protocol("empty command array".into()));
            }
            Ok(Decoded::Complete { command, consumed })
        }
        Some(_) => unreachable!("top-level value is always Value::Array after the '*' check"),
    }
}

enum Value {
    Simple(String),
    Integer(i64),
    Bulk(String),
    Array(Vec<Value>),
}

/// Finds the index of the next `\r\n` at or after `from`, returning `None`
/// if the terminator hasn't arrived yet.
fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..].windows(2).position(|w| w == b"\r\n").map(|p| from + p)
}

/// Parses one RESP value starting at `buf[0]`. Returns `None` when more
/// bytes are needed, `Some((value, bytes_consumed))` on success.
fn parse_value(buf: &[u8]) -> KvResult<Option<(Value, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    match buf[0] {
        b'+' => parse_line(buf).map(|opt| opt.map(|(s, n)| (Value::Simple(s), n))),
        b'-' => parse_line(buf).map(|opt| opt.map(|(s, n)| (Value::Simple(s), n))),
        b':' => parse_integer_line(buf).map(|opt| opt.map(|(i, n)| (Value::Integer(i), n))),
        b'$' => parse_bulk_string(buf),
        b'*' => parse_array(buf),
        other => Err(KvError::Protocol(format!("unexpected type byte '{}'", other as char))),
    }
}

/// Parses a CRLF-terminated line after a one-byte type prefix, e.g.
/// `+OK\r\n` or `-ERR message\r\n`.
fn parse_line(buf: &[u8]) -> KvResult<Option<(String, usize)>> {
    let Some(crlf) = find_crlf(buf, 1) else { return Ok(None) };
    let text = std::str::from_utf8(&buf[1..crlf])
        .map_err(|_| KvError::Protocol("non-UTF-8 line".into()))?
        .to_string();
    Ok(Some((text, crlf + 2)))
}

fn parse_integer_line(buf: &[u8]) -> KvResult<Option<(i64, usize)>> {
    let Some(crlf) = find_crlf(buf, 1) else { return Ok(None) };
    let text = std::str::from_utf8(&buf[1..crlf])
        .map_err(|_| KvError::Protocol("non-UTF-8 integer".into()))?;
    let value = text.parse::<i64>().map_err(|_| KvError::Protocol("invalid integer".into()))?;
    Ok(Some((value, crlf + 2)))
}

fn parse_bulk_string(buf: &[u8]) -> KvResult<Option<(Value, usize)>> {
    let Some(crlf) = find_crlf(buf, 1) else { return Ok(None) };
    let len_text = std::str::from_utf8(&buf[1..crlf])
        .map_err(|_| KvError::Protocol("non-UTF-8 bulk length".into()))?;
    let len: i64 =
        len_text.parse().map_err(|_| KvError::Protocol("invalid bulk length".into()))?;

    if len < 0 {
        // `$-1\r\n`: a nil bulk string. Only valid as a standalone reply,
        // never inside a command array (commands are arrays of real bulk
        // strings) — the caller rejects it there.
        return Ok(Some((Value::Bulk(String::new()), crlf + 2)));
    }
    let len = len as usize;
    let data_start = crlf + 2;
    let data_end = data_start + len;
    let terminator_end = data_end + 2;
    if buf.len() < terminator_end {
        return Ok(None);
    }
    if &buf[data_end..terminator_end] != b"\r\n" {
        return Err(KvError::Protocol("malformed bulk string terminator".into()));
    }
    let text = std::str::from_utf8(&buf[data_start..data_end])
        .map_err(|_| KvError::Protocol("non-UTF-8 bulk string".into()))?
        .to_string();
    Ok(Some((Value::Bulk(text), terminator_end)))
}

fn parse_array(buf: &[u8]) -> KvResult<Option<(Value, usize)>> {
    let Some(crlf) = find_crlf(buf, 1) else { return Ok(None) };
    let len_text = std::str::from_utf8(&buf[1..crlf])
        .map_err(|_| KvError::Protocol("non-UTF-8 array length".into()))?;
    let len: i64 =
        len_text.parse().map_err(|_| KvError::Protocol("invalid array length".into()))?;
    if len < 0 {
        return Ok(Some((Value::Array(Vec::new()), crlf + 2)));
    }
    let len = len as usize;
    let mut pos = crlf + 2;
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        match parse_value(&buf[pos..])? {
            None => return Ok(None),
            Some((value, consumed)) => {
                items.push(value);
                pos += consumed;
            }
        }
    }
    Ok(Some((Value::Array(items), pos)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_command() {
        let buf = b"*2\r\n$4\r\nPING\r\n$4\r\npong\r\n";
        match try_parse_command(buf).unwrap() {
            Decoded::Complete { command, consumed } => {
                assert_eq!(command, vec!["PING".to_string(), "pong".to_string()]);
                assert_eq!(consumed, buf.len());
            }
            Decoded::Incomplete => panic!("expected a complete command"),
        }
    }

    #[test]
    fn reports_incomplete_on_a_truncated_buffer() {
        let buf = b"*2\r\n$4\r\nPING\r\n$4\r\npo";
        assert!(matches!(try_parse_command(buf).unwrap(), Decoded::Incomplete));
    }

    #[test]
    fn reports_incomplete_on_an_empty_buffer() {
        assert!(matches!(try_parse_command(b"").unwrap(), Decoded::Incomplete));
    }

    #[test]
    fn rejects_a_non_array_top_level_frame() {
        let buf = b"+PING\r\n";
        assert!(try_parse_command(buf).is_err());
    }

    #[test]
    fn rejects_an_empty_command_array() {
        let buf = b"*0\r\n";
        assert!(try_parse_command(buf).is_err());
    }

    #[test]
    fn parses_back_to_back_commands_from_one_buffer() {
        let buf = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
        let Decoded::Complete { consumed, .. } = try_parse_command(buf).unwrap() else {
            panic!("expected complete");
        };
        let Decoded::Complete { command, .. } = try_parse_command(&buf[consumed..]).unwrap()
        else {
            panic!("expected a second complete command");
        };
        assert_eq!(command, vec!["PING".to_string()]);
    }
}
