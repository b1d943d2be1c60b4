// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::BTreeMap;

use super::Value;
use crate::errors::BencodeError;

pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Decodes a complete bencode buffer. Anything left over after the top-level
/// value is an error, so a successful decode consumed the whole input.
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut d = Decoder::new(data);
    let v = d.decode_value()?;
    if d.pos != data.len() {
        return Err(BencodeError::TrailingData { pos: d.pos });
    }
    Ok(v)
}

/// Decodes a top-level dictionary while recording the raw byte span of the
/// value under `key`, the first time the key appears. The span is a
/// sub-slice of `data`, byte-identical to what was on the wire: hashing it
/// reproduces the hash of the original encoding.
pub fn decode_root_dict_with_span<'a>(
    data: &'a [u8],
    key: &[u8],
) -> Result<(Value, Option<&'a [u8]>), BencodeError> {
    let mut d = Decoder::new(data);
    if d.peek() != Some(b'd') {
        return Err(BencodeError::ExpectedRootDict);
    }
    d.pos += 1;

    let mut dict = BTreeMap::new();
    let mut span: Option<&'a [u8]> = None;

    loop {
        match d.peek() {
            None => return Err(BencodeError::UnexpectedEnd { pos: d.pos }),
            Some(b'e') => {
                d.pos += 1;
                break;
            }
            Some(_) => {}
        }
        let k = d.decode_string()?;
        let start = d.pos;
        let v = d.decode_value()?;
        let end = d.pos;
        if span.is_none() && k == key {
            span = Some(&data[start..end]);
        }
        dict.insert(k, v);
    }

    if d.pos != data.len() {
        return Err(BencodeError::TrailingData { pos: d.pos });
    }
    Ok((Value::Dict(dict), span))
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn decode_value(&mut self) -> Result<Value, BencodeError> {
        match self.peek() {
            None => Err(BencodeError::UnexpectedEnd { pos: self.pos }),
            Some(b'i') => self.decode_int().map(Value::Int),
            Some(b'l') => self.decode_list(),
            Some(b'd') => self.decode_dict(),
            Some(c) if c.is_ascii_digit() => self.decode_string().map(Value::Bytes),
            Some(_) => Err(BencodeError::InvalidToken { pos: self.pos }),
        }
    }

    /// `i<digits>e` with the usual strictness: no empty body, no `-0`, no
    /// leading zeros.
    fn decode_int(&mut self) -> Result<i64, BencodeError> {
        let start = self.pos;
        self.pos += 1; // consume 'i'

        let neg = if self.peek() == Some(b'-') {
            self.pos += 1;
            true
        } else {
            false
        };

        let digits_start = self.pos;
        let mut n: i64 = 0;
        loop {
            match self.peek() {
                None => return Err(BencodeError::UnexpectedEnd { pos: self.pos }),
                Some(b'e') => {
                    self.pos += 1;
                    break;
                }
                Some(c) if c.is_ascii_digit() => {
                    n = n
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(i64::from(c - b'0')))
                        .ok_or(BencodeError::InvalidInteger { pos: start })?;
                    self.pos += 1;
                }
                Some(_) => return Err(BencodeError::InvalidInteger { pos: self.pos }),
            }
        }

        let digits = self.pos - 1 - digits_start;
        if digits == 0 {
            return Err(BencodeError::InvalidInteger { pos: start });
        }
        // Minimal form only: `i0e` is fine, `i-0e` and `i03e` are not.
        if self.data[digits_start] == b'0' && (neg || digits > 1) {
            return Err(BencodeError::InvalidInteger { pos: start });
        }

        Ok(if neg { -n } else { n })
    }

    fn decode_string(&mut self) -> Result<Vec<u8>, BencodeError> {
        let start = self.pos;
        let mut len: usize = 0;
        let mut saw_digit = false;
        loop {
            match self.peek() {
                None => return Err(BencodeError::UnexpectedEnd { pos: self.pos }),
                Some(b':') => {
                    self.pos += 1;
                    break;
                }
                Some(c) if c.is_ascii_digit() => {
                    len = len
                        .checked_mul(10)
                        .and_then(|l| l.checked_add(usize::from(c - b'0')))
                        .ok_or(BencodeError::InvalidStringLength { pos: start })?;
                    saw_digit = true;
                    self.pos += 1;
                }
                Some(_) => return Err(BencodeError::InvalidStringLength { pos: self.pos }),
            }
        }
        if !saw_digit {
            return Err(BencodeError::InvalidStringLength { pos: start });
        }
        if self.pos + len > self.data.len() {
            return Err(BencodeError::StringOutOfBounds { pos: self.pos });
        }
        let out = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(out)
    }

    fn decode_list(&mut self) -> Result<Value, BencodeError> {
        self.pos += 1; // consume 'l'
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err(BencodeError::UnexpectedEnd { pos: self.pos }),
                Some(b'e') => {
                    self.pos += 1;
                    return Ok(Value::List(out));
                }
                Some(_) => out.push(self.decode_value()?),
            }
        }
    }

    fn decode_dict(&mut self) -> Result<Value, BencodeError> {
        self.pos += 1; // consume 'd'
        let mut out = BTreeMap::new();
        loop {
            match self.peek() {
                None => return Err(BencodeError::UnexpectedEnd { pos: self.pos }),
                Some(b'e') => {
                    self.pos += 1;
                    return Ok(Value::Dict(out));
                }
                Some(c) if c.is_ascii_digit() => {
                    let k = self.decode_string()?;
                    let v = self.decode_value()?;
                    out.insert(k, v);
                }
                Some(_) => return Err(BencodeError::InvalidDictKey { pos: self.pos }),
            }
        }
    }
}
