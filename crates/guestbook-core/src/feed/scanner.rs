//! Byte-level scanner for poll-style feeds
//!
//! Reads a buffered byte stream a token at a time so a `{"results":[...]}`
//! response can be walked without loading the whole array.

use std::io::{BufRead, BufReader, Read};

use serde::de::DeserializeOwned;

use super::boundary::ObjectBoundary;
use super::event::Sequence;
use crate::couch::{Error, Result};

/// Read buffer size for feed connections
const READ_BUFFER_SIZE: usize = 4096;

/// Space, tab, CR and LF. Nothing else counts as whitespace.
fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// Scanner over a buffered byte source
pub struct Scanner<R: Read> {
    input: BufReader<R>,
    /// Bytes of the object currently being buffered
    object: Vec<u8>,
    boundary: ObjectBoundary,
}

impl<R: Read> Scanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            input: BufReader::with_capacity(READ_BUFFER_SIZE, reader),
            object: Vec::new(),
            boundary: ObjectBoundary::new(),
        }
    }

    /// Return the next non-whitespace byte without consuming it.
    ///
    /// Whitespace in front of it is consumed.
    pub fn peek(&mut self) -> Result<u8> {
        loop {
            let buf = self.input.fill_buf()?;
            let Some(&b) = buf.first() else {
                return Err(Error::unexpected_eof("feed ended unexpectedly"));
            };
            if !is_whitespace(b) {
                return Ok(b);
            }
            self.input.consume(1);
        }
    }

    /// Drop the next byte from the input stream.
    pub fn skip_byte(&mut self) -> Result<()> {
        self.read_byte().map(|_| ())
    }

    /// Verify that the given tokens follow in the input stream.
    /// Whitespace before each token is skipped.
    pub fn match_tokens(&mut self, tokens: &[&str]) -> Result<()> {
        for token in tokens {
            let expected = token.as_bytes();
            let mut found = Vec::with_capacity(expected.len());
            found.push(self.skip_whitespace_and_read_byte()?);
            for _ in 1..expected.len() {
                found.push(self.read_byte()?);
            }
            if found != expected {
                return Err(Error::protocol(&found, token));
            }
        }
        Ok(())
    }

    /// Discard whitespace and return the first byte after it.
    pub fn skip_whitespace_and_read_byte(&mut self) -> Result<u8> {
        loop {
            let b = self.read_byte()?;
            if !is_whitespace(b) {
                return Ok(b);
            }
        }
    }

    /// Read a bare sequence value: a quoted string or an integer.
    ///
    /// Nothing past the end of the value is consumed.
    pub fn read_sequence(&mut self) -> Result<Sequence> {
        if self.peek()? == b'"' {
            self.skip_byte()?;
            return self.read_string().map(Sequence::Opaque);
        }

        let mut digits = Vec::new();
        loop {
            let buf = self.input.fill_buf()?;
            let Some(&b) = buf.first() else {
                break;
            };
            let accepted = b.is_ascii_digit() || (b == b'-' && digits.is_empty());
            if !accepted {
                break;
            }
            digits.push(b);
            self.input.consume(1);
        }

        std::str::from_utf8(&digits)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Sequence::Number)
            .ok_or_else(|| Error::protocol(&digits, "integer or string sequence"))
    }

    /// Read the rest of a string whose opening quote was consumed.
    /// Escapes are kept verbatim.
    fn read_string(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        let mut escaped = false;
        loop {
            let b = self.read_byte()?;
            match b {
                b'"' if !escaped => break,
                b'\\' if !escaped => escaped = true,
                _ => escaped = false,
            }
            bytes.push(b);
        }
        String::from_utf8(bytes).map_err(|e| Error::protocol(e.as_bytes(), "UTF-8 string"))
    }

    /// Buffer exactly one JSON object from the input and decode it.
    pub fn decode_object<T: DeserializeOwned>(&mut self) -> Result<T> {
        let first = self.skip_whitespace_and_read_byte()?;
        if first != b'{' {
            return Err(Error::protocol(&[first], "{"));
        }

        self.object.clear();
        self.object.push(first);
        self.boundary.reset();
        loop {
            let b = self.read_byte()?;
            self.object.push(b);
            if self.boundary.step(b) {
                break;
            }
        }

        Ok(serde_json::from_slice(&self.object)?)
    }

    /// Bytes of the most recently buffered object
    #[cfg(test)]
    pub(crate) fn last_object(&self) -> &[u8] {
        &self.object
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.input.read_exact(&mut byte)?;
        Ok(byte[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::io::{Cursor, ErrorKind};

    fn scanner(input: &str) -> Scanner<Cursor<Vec<u8>>> {
        Scanner::new(Cursor::new(input.as_bytes().to_vec()))
    }

    #[test]
    fn test_peek_skips_whitespace_without_consuming() {
        let mut scan = scanner(" \t\r\n x");
        assert_eq!(scan.peek().unwrap(), b'x');
        assert_eq!(scan.peek().unwrap(), b'x');
        assert_eq!(scan.skip_whitespace_and_read_byte().unwrap(), b'x');
    }

    #[test]
    fn test_peek_at_end_of_stream() {
        let mut scan = scanner("   ");
        match scan.peek() {
            Err(Error::Io(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_other_bytes_are_not_whitespace() {
        // Vertical tab and form feed are significant
        let mut scan = scanner("\x0b{");
        assert_eq!(scan.peek().unwrap(), 0x0b);
    }

    #[test]
    fn test_match_tokens() {
        let mut scan = scanner("{ \"results\" :\n[ ]");
        scan.match_tokens(&["{", "\"results\"", ":", "["]).unwrap();
        assert_eq!(scan.peek().unwrap(), b']');
    }

    #[test]
    fn test_match_tokens_mismatch() {
        let mut scan = scanner("{\"rows\":[]}");
        match scan.match_tokens(&["{", "\"results\"", ":", "["]) {
            Err(Error::Protocol { found, expected }) => {
                assert_eq!(found, "\"rows\":[]");
                assert_eq!(expected, "\"results\"");
            }
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_match_tokens_truncated() {
        let mut scan = scanner("{\"res");
        assert!(matches!(
            scan.match_tokens(&["{", "\"results\""]),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_read_sequence_integer() {
        let mut scan = scanner(" 42}");
        assert_eq!(scan.read_sequence().unwrap(), Sequence::Number(42));
        // The closing brace is left in place
        assert_eq!(scan.peek().unwrap(), b'}');
    }

    #[test]
    fn test_read_sequence_at_end_of_stream() {
        let mut scan = scanner("7");
        assert_eq!(scan.read_sequence().unwrap(), Sequence::Number(7));
    }

    #[test]
    fn test_read_sequence_string() {
        let mut scan = scanner("\"12-g1AAAA\\\"x\",\"pending\":0}");
        assert_eq!(
            scan.read_sequence().unwrap(),
            Sequence::Opaque("12-g1AAAA\\\"x".to_string())
        );
        assert_eq!(scan.peek().unwrap(), b',');
    }

    #[test]
    fn test_read_sequence_garbage() {
        let mut scan = scanner("null}");
        assert!(matches!(
            scan.read_sequence(),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_decode_object_stops_at_boundary() {
        let mut scan = scanner(r#" {"a":{"b":"}"}} ,{"c":1}"#);
        let first: Value = scan.decode_object().unwrap();
        assert_eq!(first["a"]["b"], "}");
        assert_eq!(scan.last_object(), br#"{"a":{"b":"}"}}"#);
        assert_eq!(scan.peek().unwrap(), b',');
    }

    #[test]
    fn test_decode_object_rejects_non_object() {
        let mut scan = scanner("[1,2]");
        match scan.decode_object::<Value>() {
            Err(Error::Protocol { found, expected }) => {
                assert_eq!(found, "[");
                assert_eq!(expected, "{");
            }
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_object_invalid_json() {
        let mut scan = scanner(r#"{"a" 1}"#);
        assert!(matches!(
            scan.decode_object::<Value>(),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_decode_object_truncated() {
        let mut scan = scanner(r#"{"a":"unterminated"#);
        assert!(matches!(scan.decode_object::<Value>(), Err(Error::Io(_))));
    }
}
