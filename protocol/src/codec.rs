//! Byte layout of protocol messages. All integers are big-endian.
//!
//! Header, sent once by the sender at the start of a session:
//!
//! - file count (16 bits)
//! - initialization vector (128 bits)
//! - for each file:
//!   - name (255 bytes, zero-padded)
//!   - raw size (32 bits)
//!   - SHA-512 of the raw content (64 bytes)
//!
//! Response, sent by the receiver after the header and after every file:
//!
//! - index of the next requested file (16 bits, 1-based)
//! - status of the previous file (8 bits, 0 = failed, 1 = ok)
//!
//! A header whose first [`HEADER_PREFIX_LEN`] bytes are all zero is a burn
//! request: the receiver deletes the sender's key instead of starting a
//! transfer. An all-zero response means "no key" or "burn acknowledged".
//! Both are overloads of otherwise meaningless values and are kept only for
//! compatibility; new message kinds should not be encoded this way.

use {
    crate::{
        ContentHash, FileEntry, HASH_LEN, Manifest, NAME_LEN, ProtocolError,
        credentials::{IV_LEN, InitVector},
        manifest::MAX_FILES,
    },
    byteorder::{BE, ByteOrder},
};

const COUNT_LEN: usize = 2;
const SIZE_LEN: usize = 4;

/// Length of the fixed part of the header (file count and IV).
pub const HEADER_PREFIX_LEN: usize = COUNT_LEN + IV_LEN;

/// Length of one file entry in the header.
pub const ENTRY_LEN: usize = NAME_LEN + SIZE_LEN + HASH_LEN;

pub const RESPONSE_LEN: usize = 3;

/// Total header length for `count` files.
#[must_use]
#[inline]
#[expect(clippy::arithmetic_side_effects, reason = "bounded by u16::MAX entries")]
pub fn header_len(count: u16) -> usize {
    HEADER_PREFIX_LEN + usize::from(count) * ENTRY_LEN
}

/// Bytes a sender transmits to request revocation of its key.
#[must_use]
#[inline]
pub fn burn_header() -> [u8; HEADER_PREFIX_LEN] {
    [0; HEADER_PREFIX_LEN]
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let truncated = |expected| ProtocolError::Truncated {
            expected,
            actual: self.data.len(),
        };
        let end = self
            .offset
            .checked_add(len)
            .ok_or_else(|| truncated(usize::MAX))?;
        let bytes = self.data.get(self.offset..end).ok_or_else(|| truncated(end))?;
        self.offset = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(BE::read_u16(self.take(COUNT_LEN)?))
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(BE::read_u32(self.take(SIZE_LEN)?))
    }
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn put_u16(&mut self, value: u16) {
        let mut bytes = [0; 2];
        BE::write_u16(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    fn put_u32(&mut self, value: u32) {
        let mut bytes = [0; 4];
        BE::write_u32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes `bytes` into a field of `width` bytes, zero-filling the rest.
    /// `bytes` must not be longer than `width`.
    fn put_padded(&mut self, bytes: &[u8], width: usize) {
        let start = self.buf.len();
        self.buf.extend_from_slice(bytes);
        self.buf.resize(start.saturating_add(width), 0);
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cuts a name to at most [`NAME_LEN`] bytes without splitting a character.
#[must_use]
#[inline]
pub fn truncate_name(name: &str) -> &str {
    if name.len() <= NAME_LEN {
        return name;
    }
    let end = (0..=NAME_LEN)
        .rev()
        .find(|&index| name.is_char_boundary(index))
        .unwrap_or(0);
    name.get(..end).unwrap_or_default()
}

#[inline]
pub fn encode_header(manifest: &Manifest) -> Result<Vec<u8>, ProtocolError> {
    let count = u16::try_from(manifest.len())
        .ok()
        .filter(|&count| usize::from(count) <= MAX_FILES)
        .ok_or(ProtocolError::TooManyFiles(manifest.len()))?;

    let mut writer = Writer::with_capacity(header_len(count));
    writer.put_u16(count);
    writer.put_bytes(manifest.init_vector().as_bytes());
    for entry in manifest.entries() {
        writer.put_padded(truncate_name(&entry.name).as_bytes(), NAME_LEN);
        writer.put_u32(entry.size);
        writer.put_bytes(entry.hash.as_bytes());
    }
    Ok(writer.into_inner())
}

/// Fixed part of a header, read before the entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPrefix {
    pub count: u16,
    pub init_vector: InitVector,
}

impl HeaderPrefix {
    #[must_use]
    #[inline]
    pub fn is_burn(&self) -> bool {
        self.count == 0 && *self.init_vector.as_bytes() == [0; IV_LEN]
    }

    /// Number of entry bytes that follow the prefix.
    #[must_use]
    #[inline]
    pub fn entries_len(&self) -> usize {
        header_len(self.count).saturating_sub(HEADER_PREFIX_LEN)
    }
}

fn read_prefix(reader: &mut Reader<'_>) -> Result<HeaderPrefix, ProtocolError> {
    let count = reader.read_u16()?;
    if usize::from(count) > MAX_FILES {
        return Err(ProtocolError::TooManyFiles(count.into()));
    }
    let init_vector = InitVector::from_bytes(reader.take_array()?);
    Ok(HeaderPrefix { count, init_vector })
}

#[inline]
pub fn decode_header_prefix(bytes: &[u8]) -> Result<HeaderPrefix, ProtocolError> {
    read_prefix(&mut Reader::new(bytes))
}

#[inline]
pub fn decode_header(bytes: &[u8]) -> Result<Manifest, ProtocolError> {
    let mut reader = Reader::new(bytes);
    let prefix = read_prefix(&mut reader)?;
    let expected = header_len(prefix.count);
    if bytes.len() < expected {
        return Err(ProtocolError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }

    let mut manifest = Manifest::new(prefix.init_vector);
    for _ in 0..prefix.count {
        let raw_name = reader.take(NAME_LEN)?;
        let name_len = raw_name
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(raw_name.len());
        let name = String::from_utf8_lossy(raw_name.get(..name_len).unwrap_or_default());
        let size = reader.read_u32()?;
        let hash = ContentHash::new(reader.take_array()?);
        manifest.push(FileEntry::new(name, size, hash));
    }
    Ok(manifest)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Failed,
    Ok,
}

impl TransferStatus {
    #[must_use]
    #[inline]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Failed => 0,
            Self::Ok => 1,
        }
    }

    #[inline]
    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0 => Ok(Self::Failed),
            1 => Ok(Self::Ok),
            _ => Err(ProtocolError::InvalidStatus(byte)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// 1-based index of the next requested file. Anything outside the
    /// manifest means no more files are requested.
    pub next_index: u16,
    /// Outcome of the file sent before this response.
    pub status: TransferStatus,
}

impl Response {
    /// "No key" when sent in reply to a header, "key revoked" when sent in
    /// reply to a burn request.
    pub const SENTINEL: Self = Self {
        next_index: 0,
        status: TransferStatus::Failed,
    };

    #[must_use]
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    #[must_use]
    #[inline]
    pub fn to_bytes(self) -> [u8; RESPONSE_LEN] {
        encode_response(self.next_index, self.status)
    }
}

#[must_use]
#[inline]
pub fn encode_response(next_index: u16, status: TransferStatus) -> [u8; RESPONSE_LEN] {
    let mut bytes = [0; RESPONSE_LEN];
    let (index, rest) = bytes.split_at_mut(COUNT_LEN);
    BE::write_u16(index, next_index);
    if let Some(byte) = rest.first_mut() {
        *byte = status.to_byte();
    }
    bytes
}

#[inline]
pub fn decode_response(bytes: &[u8]) -> Result<Response, ProtocolError> {
    let mut reader = Reader::new(bytes);
    let next_index = reader.read_u16()?;
    let [status]: [u8; 1] = reader.take_array()?;
    Ok(Response {
        next_index,
        status: TransferStatus::from_byte(status)?,
    })
}
