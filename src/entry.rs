//! The entry wire format.
//!
//! An entry is the fixed-size record produced for every cyclic fieldbus
//! update: a structured wall-clock timestamp followed by the raw variable
//! words. The same layout is used in the ring and on disk; multi-byte fields
//! are stored in the byte order declared by the enclosing file's header.

use bytes::{Buf, BufMut};

/// Width of the variable-data block in bytes, fixed by the device model.
pub const VARIABLE_DATA_SIZE: usize = 128;

/// Serialized size of one entry: a 12-byte timestamp plus the variable words.
pub const ENTRY_SIZE: usize = 12 + VARIABLE_DATA_SIZE;

/// Variable words per entry, as written into the file header.
pub const WORD_COUNT: u8 = (VARIABLE_DATA_SIZE / 2) as u8;

/// Length of the timestamp prefix (through `second`) that identifies an
/// entry's bucket without decoding the whole record.
pub const ENTRY_HEAD_SIZE: usize = 8;

/// Byte order of multi-byte fields in a log file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

impl Endian {
    /// The three-byte marker written into the file header.
    pub const fn tag(self) -> [u8; 3] {
        match self {
            Endian::Big => [0x50, 0x4E, 0x4C],    // "PNL"
            Endian::Little => [0x4C, 0x4E, 0x50], // "LNP"
        }
    }

    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            [0x50, 0x4E, 0x4C] => Some(Endian::Big),
            [0x4C, 0x4E, 0x50] => Some(Endian::Little),
            _ => None,
        }
    }
}

/// Structured wall-clock timestamp as delivered by the controller.
///
/// A `year` of zero means the controller has not initialized its clock yet;
/// such entries are discarded at the ingest endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub nanosecond: u32,
}

impl Timestamp {
    /// Serializes the 12-byte timestamp prefix into the front of `out`.
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than 12 bytes.
    pub fn encode(&self, endian: Endian, mut out: &mut [u8]) {
        match endian {
            Endian::Big => out.put_u16(self.year),
            Endian::Little => out.put_u16_le(self.year),
        }
        out.put_u8(self.month);
        out.put_u8(self.day);
        out.put_u8(self.weekday);
        out.put_u8(self.hour);
        out.put_u8(self.minute);
        out.put_u8(self.second);
        match endian {
            Endian::Big => out.put_u32(self.nanosecond),
            Endian::Little => out.put_u32_le(self.nanosecond),
        }
    }

    /// Decodes a full 12-byte timestamp prefix.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than 12 bytes.
    pub fn decode(bytes: &[u8], endian: Endian) -> Self {
        let mut ts = Self::decode_head(bytes[..ENTRY_HEAD_SIZE].try_into().expect("sized above"), endian);
        let mut rest = &bytes[ENTRY_HEAD_SIZE..];
        ts.nanosecond = match endian {
            Endian::Big => rest.get_u32(),
            Endian::Little => rest.get_u32_le(),
        };
        ts
    }

    /// Decodes the 8-byte head of an entry (through `second`), enough to
    /// place it in a bucket. The nanosecond field is left zero.
    pub fn decode_head(bytes: &[u8; ENTRY_HEAD_SIZE], endian: Endian) -> Self {
        let year = match endian {
            Endian::Big => u16::from_be_bytes([bytes[0], bytes[1]]),
            Endian::Little => u16::from_le_bytes([bytes[0], bytes[1]]),
        };
        Timestamp {
            year,
            month: bytes[2],
            day: bytes[3],
            weekday: bytes[4],
            hour: bytes[5],
            minute: bytes[6],
            second: bytes[7],
            nanosecond: 0,
        }
    }

    /// The 10-minute bucket this timestamp falls into.
    pub fn bucket(&self) -> Bucket {
        Bucket {
            year: self.year,
            month: self.month,
            day: self.day,
            hour: self.hour,
            ten_minute: self.minute / 10,
        }
    }

    pub fn date(&self) -> Date {
        Date {
            year: self.year,
            month: self.month,
            day: self.day,
        }
    }
}

/// The 10-minute interval a timestamped entry belongs to; one bucket maps to
/// exactly one file on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bucket {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    /// `minute / 10`, so 0..=5.
    pub ten_minute: u8,
}

impl Bucket {
    pub fn date(&self) -> Date {
        Date {
            year: self.year,
            month: self.month,
            day: self.day,
        }
    }

    /// The minute the bucket's file is named after.
    pub fn start_minute(&self) -> u8 {
        self.ten_minute * 10
    }
}

/// A calendar date; one day group on disk.
///
/// Field order gives the derived ordering chronological meaning, which is the
/// same order the zero-padded `YYYYMMDD` names sort in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

/// A decoded entry: timestamp plus the opaque variable words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub timestamp: Timestamp,
    pub words: [u8; VARIABLE_DATA_SIZE],
}

impl Entry {
    /// Serializes the entry in the layout shared by ring and disk.
    pub fn encode(&self, endian: Endian, out: &mut [u8; ENTRY_SIZE]) {
        self.timestamp.encode(endian, &mut out[..12]);
        out[12..].copy_from_slice(&self.words);
    }

    /// Decodes one entry.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not exactly [`ENTRY_SIZE`] long.
    pub fn decode(bytes: &[u8], endian: Endian) -> Self {
        assert_eq!(bytes.len(), ENTRY_SIZE, "entry has wrong size");
        let timestamp = Timestamp::decode(&bytes[..12], endian);
        let mut words = [0u8; VARIABLE_DATA_SIZE];
        words.copy_from_slice(&bytes[12..]);
        Entry { timestamp, words }
    }
}
