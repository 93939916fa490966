// Framing of variable-size records: an 8-byte header {length:32 | type id:32}
// followed by the content, the whole record rounded up to RECORD_ALIGNMENT.

use super::bytes::align;
use super::error::RecordError;

pub const RECORD_HEADER_LENGTH: usize = std::mem::size_of::<u32>() * 2;
pub const RECORD_ALIGNMENT: usize = std::mem::size_of::<u32>() * 2;
/// Type id of the filler record written when a claim wraps past the buffer end.
pub const PADDING_MSG_TYPE_ID: i32 = -1;

/// Bytes a record with `content_length` bytes of content occupies in the buffer.
#[inline]
pub const fn required_record_capacity(content_length: usize) -> usize {
    align(content_length + RECORD_HEADER_LENGTH, RECORD_ALIGNMENT)
}

#[inline]
pub const fn encoded_msg_offset(record_offset: usize) -> usize {
    record_offset + RECORD_HEADER_LENGTH
}

/// Packs a header. `length` counts the header itself plus the content.
#[inline]
pub const fn make_header(msg_type_id: i32, length: u32) -> u64 {
    (((msg_type_id as u32) as u64) << 32) | (length as u64)
}

/// Record length stored in the header; zero (or less) means "not committed yet".
#[inline]
pub const fn record_length(header: u64) -> i32 {
    header as u32 as i32
}

#[inline]
pub const fn message_type_id(header: u64) -> i32 {
    (header >> 32) as u32 as i32
}

#[inline]
pub const fn check_msg_type_id(msg_type_id: i32) -> bool {
    msg_type_id > 0
}

/// A user message type id, always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MsgTypeId(i32);

impl MsgTypeId {
    pub fn new(id: i32) -> Result<Self, RecordError> {
        if check_msg_type_id(id) {
            Ok(Self(id))
        } else {
            Err(RecordError::ReservedTypeId(id))
        }
    }

    #[inline]
    pub fn get(self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for MsgTypeId {
    type Error = RecordError;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}
