//! Parcel - the flat message buffer
//!
//! Fields are appended in order and read back in the same order. Nothing in
//! the buffer describes its own layout; the per-opcode schema table is the
//! only agreement between writer and reader.
//!
//! Layout rules:
//! - primitives are little-endian, every field is a multiple of 4 bytes
//! - strings and opaque ranges are zero-padded to a 4-byte boundary
//! - a length of -1 encodes a null string / null array

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::handle::{RemoteHandle, HANDLE_KIND_NULL, HANDLE_KIND_OBJECT};

/// Strict-mode policy header written ahead of the descriptor
pub const STRICT_MODE_HEADER: i32 = 0;

/// Length value that marks a null string or array
const NULL_LENGTH: i32 = -1;

/// Decode and encode failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParcelError {
    #[error("Not enough data: needed {needed} bytes, {available} available")]
    NotEnoughData { needed: usize, available: usize },

    #[error("Invalid length prefix: {0}")]
    InvalidLength(i32),

    #[error("Field too large to encode: {0} elements")]
    TooLarge(usize),

    #[error("String is not valid UTF-8/UTF-16")]
    InvalidString,

    #[error("String terminator missing")]
    MissingTerminator,

    #[error("Invalid handle: kind={kind}, id={id}")]
    InvalidHandle { kind: i32, id: u64 },

    #[error("Value out of range: {0}")]
    OutOfRange(i64),
}

pub type ParcelResult<T> = Result<T, ParcelError>;

/// Shape of a single field, recorded as fields are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Int32,
    Int64,
    Bool,
    String16,
    String8,
    ByteArray,
    RawInt32s,
    Handle,
    InterfaceToken,
}

fn padded_len(len: usize) -> ParcelResult<usize> {
    len.checked_add(3)
        .map(|n| n & !3)
        .ok_or(ParcelError::TooLarge(len))
}

fn length_prefix(len: usize) -> ParcelResult<i32> {
    i32::try_from(len).map_err(|_| ParcelError::TooLarge(len))
}

/// A single request or reply message
#[derive(Debug, Clone, Default)]
pub struct Parcel {
    data: BytesMut,
    read_pos: usize,
    fields: Vec<FieldKind>,
}

impl Parcel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap received bytes for reading
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            read_pos: 0,
            fields: Vec::new(),
        }
    }

    /// Raw encoded contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Freeze the contents for handoff to a transport
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Bytes left to read
    pub fn data_avail(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    pub fn data_position(&self) -> usize {
        self.read_pos
    }

    /// Move the read cursor, clamped to the end of the data
    pub fn set_data_position(&mut self, pos: usize) {
        self.read_pos = pos.min(self.data.len());
    }

    /// Kinds of every field written so far, in order
    pub fn written_fields(&self) -> &[FieldKind] {
        &self.fields
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    fn put_padding(&mut self) {
        while self.data.len() % 4 != 0 {
            self.data.put_u8(0);
        }
    }

    pub fn write_i32(&mut self, value: i32) {
        self.data.put_i32_le(value);
        self.fields.push(FieldKind::Int32);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.put_u32_le(value);
        self.fields.push(FieldKind::Int32);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.data.put_i64_le(value);
        self.fields.push(FieldKind::Int64);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.data.put_i32_le(value as i32);
        self.fields.push(FieldKind::Bool);
    }

    fn put_string16(&mut self, value: &str) -> ParcelResult<()> {
        let units: Vec<u16> = value.encode_utf16().collect();
        self.data.put_i32_le(length_prefix(units.len())?);
        for unit in units.iter().copied().chain(std::iter::once(0)) {
            self.data.put_u16_le(unit);
        }
        self.put_padding();
        Ok(())
    }

    /// Length-prefixed UTF-16 string
    pub fn write_string16(&mut self, value: &str) -> ParcelResult<()> {
        self.put_string16(value)?;
        self.fields.push(FieldKind::String16);
        Ok(())
    }

    pub fn write_null_string16(&mut self) {
        self.data.put_i32_le(NULL_LENGTH);
        self.fields.push(FieldKind::String16);
    }

    /// Length-prefixed UTF-8 string
    pub fn write_string8(&mut self, value: &str) -> ParcelResult<()> {
        self.data.put_i32_le(length_prefix(value.len())?);
        self.data.put_slice(value.as_bytes());
        self.data.put_u8(0);
        self.put_padding();
        self.fields.push(FieldKind::String8);
        Ok(())
    }

    /// Length-prefixed opaque byte range
    pub fn write_byte_array(&mut self, value: &[u8]) -> ParcelResult<()> {
        self.data.put_i32_le(length_prefix(value.len())?);
        self.data.put_slice(value);
        self.put_padding();
        self.fields.push(FieldKind::ByteArray);
        Ok(())
    }

    pub fn write_null_byte_array(&mut self) {
        self.data.put_i32_le(NULL_LENGTH);
        self.fields.push(FieldKind::ByteArray);
    }

    /// Unprefixed run of int32 values; the reader must know the count
    pub fn write_raw_i32s(&mut self, values: &[i32]) {
        for value in values {
            self.data.put_i32_le(*value);
        }
        self.fields.push(FieldKind::RawInt32s);
    }

    pub fn write_handle(&mut self, handle: RemoteHandle) {
        let (kind, id) = handle.to_wire();
        self.data.put_i32_le(kind);
        self.data.put_u64_le(id);
        self.fields.push(FieldKind::Handle);
    }

    /// Strict-mode header followed by the interface descriptor
    pub fn write_interface_token(&mut self, descriptor: &str) -> ParcelResult<()> {
        self.data.put_i32_le(STRICT_MODE_HEADER);
        self.put_string16(descriptor)?;
        self.fields.push(FieldKind::InterfaceToken);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Consume exactly `len` bytes, or fail without moving the cursor
    fn take(&mut self, len: usize) -> ParcelResult<&[u8]> {
        let available = self.data_avail();
        if available < len {
            return Err(ParcelError::NotEnoughData {
                needed: len,
                available,
            });
        }
        let start = self.read_pos;
        self.read_pos += len;
        Ok(&self.data[start..start + len])
    }

    /// Consume `len` bytes plus their padding
    fn take_padded(&mut self, len: usize) -> ParcelResult<&[u8]> {
        let padded = padded_len(len)?;
        let available = self.data_avail();
        if available < padded {
            return Err(ParcelError::NotEnoughData {
                needed: padded,
                available,
            });
        }
        let start = self.read_pos;
        self.read_pos += padded;
        Ok(&self.data[start..start + len])
    }

    pub fn read_i32(&mut self) -> ParcelResult<i32> {
        let mut bytes = self.take(4)?;
        Ok(bytes.get_i32_le())
    }

    pub fn read_u32(&mut self) -> ParcelResult<u32> {
        let mut bytes = self.take(4)?;
        Ok(bytes.get_u32_le())
    }

    pub fn read_i64(&mut self) -> ParcelResult<i64> {
        let mut bytes = self.take(8)?;
        Ok(bytes.get_i64_le())
    }

    pub fn read_bool(&mut self) -> ParcelResult<bool> {
        Ok(self.read_i32()? != 0)
    }

    /// Read a length prefix; `None` for the null marker
    fn read_length(&mut self) -> ParcelResult<Option<usize>> {
        let len = self.read_i32()?;
        match len {
            NULL_LENGTH => Ok(None),
            n if n < 0 => Err(ParcelError::InvalidLength(n)),
            n => Ok(Some(n as usize)),
        }
    }

    /// Read a UTF-16 string; null decodes as `None`
    pub fn read_nullable_string16(&mut self) -> ParcelResult<Option<String>> {
        let start = self.read_pos;
        let result = self.read_string16_inner();
        if result.is_err() {
            self.read_pos = start;
        }
        result
    }

    fn read_string16_inner(&mut self) -> ParcelResult<Option<String>> {
        let Some(units) = self.read_length()? else {
            return Ok(None);
        };
        let byte_len = units
            .checked_add(1)
            .and_then(|n| n.checked_mul(2))
            .ok_or(ParcelError::InvalidLength(units as i32))?;
        let mut bytes = self.take_padded(byte_len)?;

        let mut decoded = Vec::with_capacity(units);
        for _ in 0..units {
            decoded.push(bytes.get_u16_le());
        }
        if bytes.get_u16_le() != 0 {
            return Err(ParcelError::MissingTerminator);
        }
        String::from_utf16(&decoded)
            .map(Some)
            .map_err(|_| ParcelError::InvalidString)
    }

    /// Read a UTF-16 string; null decodes as the empty string
    pub fn read_string16(&mut self) -> ParcelResult<String> {
        Ok(self.read_nullable_string16()?.unwrap_or_default())
    }

    /// Read a UTF-8 string; null decodes as the empty string
    pub fn read_string8(&mut self) -> ParcelResult<String> {
        let start = self.read_pos;
        let result = self.read_string8_inner();
        if result.is_err() {
            self.read_pos = start;
        }
        result
    }

    fn read_string8_inner(&mut self) -> ParcelResult<String> {
        let Some(len) = self.read_length()? else {
            return Ok(String::new());
        };
        let total = len
            .checked_add(1)
            .ok_or(ParcelError::InvalidLength(len as i32))?;
        let bytes = self.take_padded(total)?;
        if bytes[len] != 0 {
            return Err(ParcelError::MissingTerminator);
        }
        std::str::from_utf8(&bytes[..len])
            .map(str::to_owned)
            .map_err(|_| ParcelError::InvalidString)
    }

    /// Read a length-prefixed opaque range; null decodes as `None`
    pub fn read_byte_array(&mut self) -> ParcelResult<Option<Vec<u8>>> {
        let start = self.read_pos;
        let result = match self.read_length() {
            Ok(Some(len)) => self.take_padded(len).map(|b| Some(b.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.read_pos = start;
        }
        result
    }

    /// Read `count` unprefixed int32 values
    pub fn read_raw_i32s(&mut self, count: usize) -> ParcelResult<Vec<i32>> {
        let byte_len = count
            .checked_mul(4)
            .ok_or(ParcelError::TooLarge(count))?;
        let mut bytes = self.take(byte_len)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(bytes.get_i32_le());
        }
        Ok(values)
    }

    pub fn read_handle(&mut self) -> ParcelResult<RemoteHandle> {
        let mut bytes = self.take(12)?;
        let kind = bytes.get_i32_le();
        let id = bytes.get_u64_le();
        match (kind, id) {
            (HANDLE_KIND_NULL, 0) => Ok(RemoteHandle::NULL),
            (HANDLE_KIND_OBJECT, id) if id != 0 => Ok(RemoteHandle::new(id)),
            (kind, id) => {
                self.read_pos -= 12;
                Err(ParcelError::InvalidHandle { kind, id })
            }
        }
    }

    /// Read the interface token and compare it against `expected`
    ///
    /// Returns `Ok(false)` on a well-formed but different descriptor.
    pub fn enforce_interface(&mut self, expected: &str) -> ParcelResult<bool> {
        let _strict_mode = self.read_i32()?;
        let descriptor = self.read_nullable_string16()?;
        Ok(descriptor.as_deref() == Some(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_in_order() {
        let mut parcel = Parcel::new();
        parcel.write_i32(-7);
        parcel.write_bool(true);
        parcel.write_u32(0xdead_beef);
        parcel.write_i64(i64::MIN);

        let mut reader = Parcel::from_bytes(parcel.as_bytes());
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(reader.read_i64().unwrap(), i64::MIN);
        assert_eq!(reader.data_avail(), 0);
    }

    #[test]
    fn test_strings_are_padded() {
        let mut parcel = Parcel::new();
        parcel.write_string16("abc").unwrap();
        // 4 length + (3 + 1) * 2 = 12
        assert_eq!(parcel.data_size(), 12);
        parcel.write_string8("wlan0").unwrap();
        // 4 length + 5 + 1 -> 8 padded
        assert_eq!(parcel.data_size(), 24);

        let mut reader = Parcel::from_bytes(parcel.as_bytes());
        assert_eq!(reader.read_string16().unwrap(), "abc");
        assert_eq!(reader.read_string8().unwrap(), "wlan0");
    }

    #[test]
    fn test_non_ascii_string16() {
        let mut parcel = Parcel::new();
        parcel.write_string16("com.exämple.🎵").unwrap();
        let mut reader = Parcel::from_bytes(parcel.as_bytes());
        assert_eq!(reader.read_string16().unwrap(), "com.exämple.🎵");
    }

    #[test]
    fn test_null_string_and_array() {
        let mut parcel = Parcel::new();
        parcel.write_null_string16();
        parcel.write_null_byte_array();

        let mut reader = Parcel::from_bytes(parcel.as_bytes());
        assert_eq!(reader.read_nullable_string16().unwrap(), None);
        assert_eq!(reader.read_byte_array().unwrap(), None);
    }

    #[test]
    fn test_handles_preserve_identity() {
        let mut parcel = Parcel::new();
        parcel.write_handle(RemoteHandle::new(99));
        parcel.write_handle(RemoteHandle::NULL);

        let mut reader = Parcel::from_bytes(parcel.as_bytes());
        assert_eq!(reader.read_handle().unwrap(), RemoteHandle::new(99));
        assert!(reader.read_handle().unwrap().is_null());
    }

    #[test]
    fn test_short_buffer_is_decode_failure() {
        let mut reader = Parcel::from_bytes(&[1, 0]);
        assert_eq!(
            reader.read_i32(),
            Err(ParcelError::NotEnoughData {
                needed: 4,
                available: 2
            })
        );
        // cursor untouched
        assert_eq!(reader.data_position(), 0);
    }

    #[test]
    fn test_truncated_string_restores_cursor() {
        let mut parcel = Parcel::new();
        parcel.write_string16("truncated").unwrap();
        let bytes = &parcel.as_bytes()[..10];

        let mut reader = Parcel::from_bytes(bytes);
        assert!(matches!(
            reader.read_string16(),
            Err(ParcelError::NotEnoughData { .. })
        ));
        assert_eq!(reader.data_position(), 0);
    }

    #[test]
    fn test_malformed_length_prefix() {
        let mut parcel = Parcel::new();
        parcel.write_i32(-5);
        let mut reader = Parcel::from_bytes(parcel.as_bytes());
        assert_eq!(reader.read_string8(), Err(ParcelError::InvalidLength(-5)));
    }

    #[test]
    fn test_huge_length_prefix_does_not_allocate() {
        let mut parcel = Parcel::new();
        parcel.write_i32(i32::MAX);
        let mut reader = Parcel::from_bytes(parcel.as_bytes());
        assert!(matches!(
            reader.read_byte_array(),
            Err(ParcelError::NotEnoughData { .. })
        ));
    }

    #[test]
    fn test_invalid_handle_kind() {
        let mut parcel = Parcel::new();
        parcel.write_i32(7);
        parcel.write_i64(1);
        let mut reader = Parcel::from_bytes(parcel.as_bytes());
        assert_eq!(
            reader.read_handle(),
            Err(ParcelError::InvalidHandle { kind: 7, id: 1 })
        );
    }

    #[test]
    fn test_raw_ints_need_full_length() {
        let mut parcel = Parcel::new();
        parcel.write_raw_i32s(&[1, 2, 3]);
        let mut reader = Parcel::from_bytes(parcel.as_bytes());
        assert!(reader.read_raw_i32s(4).is_err());
        assert_eq!(reader.read_raw_i32s(3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_interface_token() {
        let mut parcel = Parcel::new();
        parcel.write_interface_token("svc.Contract").unwrap();
        assert_eq!(parcel.written_fields(), &[FieldKind::InterfaceToken]);

        let mut reader = Parcel::from_bytes(parcel.as_bytes());
        assert!(reader.enforce_interface("svc.Contract").unwrap());

        let mut reader = Parcel::from_bytes(parcel.as_bytes());
        assert!(!reader.enforce_interface("svc.Other").unwrap());
    }

    #[test]
    fn test_written_fields_track_order() {
        let mut parcel = Parcel::new();
        parcel.write_handle(RemoteHandle::NULL);
        parcel.write_i32(3);
        parcel.write_string8("x").unwrap();
        assert_eq!(
            parcel.written_fields(),
            &[FieldKind::Handle, FieldKind::Int32, FieldKind::String8]
        );
    }
}
