// src/wire.rs

//! Protobuf wire format: a borrowing reader and a small growable writer.
//!
//! Only the binary encoding is handled here. Field meaning lives in
//! `saved_model` and `schema`, which walk messages with [`ProtoReader`] and
//! keep length-delimited payloads as slices of the original buffer.

use std::fmt;

/// Longest legal varint encoding (a full u64).
const MAX_VARINT_LEN: usize = 10;
/// Field numbers are 29 bits wide.
const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    StartGroup,
    EndGroup,
    Fixed32,
}

impl WireType {
    fn from_bits(bits: u64) -> Option<WireType> {
        match bits {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            3 => Some(WireType::StartGroup),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }

    fn bits(self) -> u64 {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::LengthDelimited => 2,
            WireType::StartGroup => 3,
            WireType::EndGroup => 4,
            WireType::Fixed32 => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub field: u32,
    pub wire_type: WireType,
}

/// Malformed wire data. Offsets are absolute positions in the buffer the
/// outermost reader was created over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof { offset: usize },
    VarintOverflow { offset: usize },
    LengthOverflow { offset: usize, len: u64, remaining: usize },
    InvalidWireType { offset: usize, wire_type: u8 },
    InvalidFieldNumber { offset: usize, field: u64 },
    InvalidUtf8 { offset: usize },
    UnbalancedGroup { offset: usize, field: u32 },
    RecursionLimit { offset: usize, limit: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof { offset } => {
                write!(f, "unexpected end of data at byte {}", offset)
            }
            DecodeError::VarintOverflow { offset } => {
                write!(f, "varint longer than {} bytes at byte {}", MAX_VARINT_LEN, offset)
            }
            DecodeError::LengthOverflow { offset, len, remaining } => write!(
                f,
                "length prefix {} at byte {} exceeds the {} bytes remaining",
                len, offset, remaining
            ),
            DecodeError::InvalidWireType { offset, wire_type } => {
                write!(f, "invalid wire type {} at byte {}", wire_type, offset)
            }
            DecodeError::InvalidFieldNumber { offset, field } => {
                write!(f, "invalid field number {} at byte {}", field, offset)
            }
            DecodeError::InvalidUtf8 { offset } => {
                write!(f, "string field at byte {} is not valid UTF-8", offset)
            }
            DecodeError::UnbalancedGroup { offset, field } => {
                write!(f, "unbalanced group for field {} at byte {}", field, offset)
            }
            DecodeError::RecursionLimit { offset, limit } => {
                write!(f, "messages nested deeper than {} at byte {}", limit, offset)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Cursor over one message body.
#[derive(Debug, Clone)]
pub struct ProtoReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ProtoReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, base: 0 }
    }

    /// Whole body this reader walks, independent of the cursor.
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Absolute offset of the cursor.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.offset();
        let mut result: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let b = *self
                .data
                .get(self.pos)
                .ok_or(DecodeError::UnexpectedEof { offset: self.offset() })?;
            self.pos += 1;
            // The tenth byte may only carry the top bit of a u64.
            if i == MAX_VARINT_LEN - 1 && b > 1 {
                return Err(DecodeError::VarintOverflow { offset: start });
            }
            result |= ((b & 0x7F) as u64) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(DecodeError::VarintOverflow { offset: start })
    }

    pub fn read_tag(&mut self) -> Result<Tag, DecodeError> {
        let offset = self.offset();
        let key = self.read_varint()?;
        let wire_bits = key & 7;
        let wire_type = WireType::from_bits(wire_bits).ok_or(DecodeError::InvalidWireType {
            offset,
            wire_type: wire_bits as u8,
        })?;
        let field = key >> 3;
        if field == 0 || field > MAX_FIELD_NUMBER {
            return Err(DecodeError::InvalidFieldNumber { offset, field });
        }
        Ok(Tag { field: field as u32, wire_type })
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        self.read_length_delimited().map(|(_, bytes)| bytes)
    }

    /// Reads a length-delimited field as a nested message reader that keeps
    /// absolute offsets.
    pub fn read_message(&mut self) -> Result<ProtoReader<'a>, DecodeError> {
        let (base, data) = self.read_length_delimited()?;
        Ok(ProtoReader { data, pos: 0, base })
    }

    pub fn read_string(&mut self) -> Result<&'a str, DecodeError> {
        let (offset, bytes) = self.read_length_delimited()?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Skips the value that follows `tag`. A start-group tag skips up to and
    /// including its matching end-group tag.
    pub fn skip_field(&mut self, tag: Tag) -> Result<(), DecodeError> {
        match tag.wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.take(8)?;
            }
            WireType::LengthDelimited => {
                self.read_length_delimited()?;
            }
            WireType::Fixed32 => {
                self.take(4)?;
            }
            WireType::StartGroup => self.skip_group(tag.field)?,
            WireType::EndGroup => {
                return Err(DecodeError::UnbalancedGroup { offset: self.offset(), field: tag.field });
            }
        }
        Ok(())
    }

    fn skip_group(&mut self, field: u32) -> Result<(), DecodeError> {
        loop {
            if self.is_empty() {
                return Err(DecodeError::UnbalancedGroup { offset: self.offset(), field });
            }
            let offset = self.offset();
            let inner = self.read_tag()?;
            if inner.wire_type == WireType::EndGroup {
                if inner.field == field {
                    return Ok(());
                }
                return Err(DecodeError::UnbalancedGroup { offset, field: inner.field });
            }
            self.skip_field(inner)?;
        }
    }

    fn read_length_delimited(&mut self) -> Result<(usize, &'a [u8]), DecodeError> {
        let prefix_offset = self.offset();
        let len = self.read_varint()?;
        let remaining = self.remaining();
        if len > remaining as u64 {
            return Err(DecodeError::LengthOverflow { offset: prefix_offset, len, remaining });
        }
        let body_offset = self.offset();
        let bytes = self.take(len as usize)?;
        Ok((body_offset, bytes))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::UnexpectedEof { offset: self.base + self.data.len() });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }
}

/// Append-only encoder for building messages.
#[derive(Debug, Default, Clone)]
pub struct ProtoWriter {
    buf: Vec<u8>,
}

impl ProtoWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn varint(&mut self, mut value: u64) -> &mut Self {
        while value >= 0x80 {
            self.buf.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
        self
    }

    pub fn tag(&mut self, field: u32, wire_type: WireType) -> &mut Self {
        self.varint(((field as u64) << 3) | wire_type.bits())
    }

    pub fn varint_field(&mut self, field: u32, value: u64) -> &mut Self {
        self.tag(field, WireType::Varint).varint(value)
    }

    /// Signed ints use the plain two's-complement varint form, as `int32`
    /// and `int64` do.
    pub fn int_field(&mut self, field: u32, value: i64) -> &mut Self {
        self.varint_field(field, value as u64)
    }

    pub fn bytes_field(&mut self, field: u32, bytes: &[u8]) -> &mut Self {
        self.tag(field, WireType::LengthDelimited).varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn string_field(&mut self, field: u32, value: &str) -> &mut Self {
        self.bytes_field(field, value.as_bytes())
    }

    /// Encodes a nested message built by `build` as a length-delimited field.
    pub fn message_field<F>(&mut self, field: u32, build: F) -> &mut Self
    where
        F: FnOnce(&mut ProtoWriter),
    {
        let mut nested = ProtoWriter::new();
        build(&mut nested);
        self.bytes_field(field, nested.as_slice())
    }

    pub fn fixed32_field(&mut self, field: u32, value: u32) -> &mut Self {
        self.tag(field, WireType::Fixed32);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn fixed64_field(&mut self, field: u32, value: u64) -> &mut Self {
        self.tag(field, WireType::Fixed64);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Raw bytes, for hand-built or intentionally malformed input.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }
}
