//! A single bucket file on disk.
//!
//! `LogFile` owns the file handle and the write-side byte buffer. Entries are
//! framed into the buffer by the writer loop and only reach the kernel in
//! chunks of at least [`FILE_MIN_WRITE`] bytes; whatever does not fill a
//! chunk stays buffered for the next iteration. Running out of space on the
//! log volume is an expected condition: the oldest day archive is sacrificed
//! and the write retried, once per reclaimed archive.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

use bytes::BufMut;
use snafu::{IntoError, ResultExt, Snafu};

use crate::{
    archive,
    common::{FILE_BUFFER_SIZE, FILE_MIN_WRITE},
    entry::{Bucket, Endian, ENTRY_SIZE, WORD_COUNT},
    internal_events::{InternalEvent, LogFileOpened, LogFileSaved},
    params::{ParameterStore, INSTALLATION_ID_LENGTH},
    storage,
};

/// Magic number opening every log file.
pub const FILE_MAGIC: [u8; 4] = [0x61, 0x0B, 0xE7, 0xEC];

/// Current format version, byte 7 of the header.
pub const FORMAT_VERSION: u8 = 0;

/// Fixed header size: magic, endian tag, version, installation id, word count.
pub const HEADER_SIZE: usize = 4 + 3 + 1 + INSTALLATION_ID_LENGTH + 1;

/// Byte preceding every entry in the file body.
pub const FRAME_BYTE: u8 = 0x00;

/// Byte closing a cleanly finished file; a file without it was truncated.
pub const TRAILER_BYTE: u8 = 0xFF;

#[derive(Debug, Snafu)]
pub(crate) enum FileError {
    #[snafu(display("failed to create day directory {}: {source}", path.display()))]
    CreateDayDir { path: PathBuf, source: io::Error },

    #[snafu(display("no free collision suffix left in {}", dir.display()))]
    CollisionsExhausted { dir: PathBuf },

    #[snafu(display("failed to create {}: {source}", path.display()))]
    Create { path: PathBuf, source: io::Error },

    #[snafu(display("I/O error on {}: {source}", path.display()))]
    Io { path: PathBuf, source: io::Error },
}

fn is_out_of_space(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::StorageFull | ErrorKind::QuotaExceeded
    )
}

/// One open bucket file plus its write-side buffer.
#[derive(Debug)]
pub(crate) struct LogFile {
    file: File,
    path: PathBuf,
    root: PathBuf,
    buf: Vec<u8>,
    bucket: Bucket,
    endian: Endian,
    installation_id: [u8; INSTALLATION_ID_LENGTH],
}

impl LogFile {
    /// Creates the file for `bucket`, exclusively, and writes its header.
    ///
    /// The canonical `HH-MM.bin` name is tried first, then the collision
    /// suffixes `_2` through `_9`. Existing files are never truncated.
    pub(crate) fn open(
        root: &Path,
        bucket: Bucket,
        params: &ParameterStore,
        endian: Endian,
    ) -> Result<Self, FileError> {
        let day_path = root.join(storage::day_dir_name(bucket.date()));
        fs::create_dir_all(&day_path).context(CreateDayDirSnafu { path: &day_path })?;

        let mut opened = None;
        for attempt in std::iter::once(None).chain((2..=9).map(Some)) {
            let path = day_path.join(storage::bucket_file_name(bucket, attempt));
            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => {
                    opened = Some((file, path));
                    break;
                }
                Err(error) if error.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(CreateSnafu { path }.into_error(source)),
            }
        }
        let Some((file, path)) = opened else {
            return CollisionsExhaustedSnafu { dir: day_path }.fail();
        };

        let mut log = LogFile {
            file,
            path,
            root: root.to_path_buf(),
            buf: Vec::with_capacity(FILE_BUFFER_SIZE),
            bucket,
            endian,
            installation_id: params.installation_id(),
        };
        log.write_header()?;
        LogFileOpened { path: &log.path }.emit();
        Ok(log)
    }

    pub(crate) fn bucket(&self) -> Bucket {
        self.bucket
    }

    pub(crate) fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer has room for one more framed entry.
    pub(crate) fn can_accept(&self) -> bool {
        self.buf.len() + ENTRY_SIZE + 1 <= FILE_BUFFER_SIZE
    }

    /// Frames one entry into the buffer. Call only when [`can_accept`] holds.
    ///
    /// [`can_accept`]: LogFile::can_accept
    pub(crate) fn push_entry(&mut self, entry: &[u8; ENTRY_SIZE]) {
        debug_assert!(self.can_accept());
        self.buf.push(FRAME_BYTE);
        self.buf.extend_from_slice(entry);
    }

    /// Writes buffered bytes out in chunks of at least [`FILE_MIN_WRITE`];
    /// the residue stays buffered for the next iteration.
    pub(crate) fn drain(&mut self) -> Result<(), FileError> {
        let mut written = 0;
        while self.buf.len() - written >= FILE_MIN_WRITE {
            written += self.write_some(written)?;
        }
        self.buf.drain(..written);
        Ok(())
    }

    /// Flushes everything, appends the trailer, syncs and closes the file.
    pub(crate) fn finish(mut self) -> Result<(), FileError> {
        self.drain_all()?;
        self.buf.push(TRAILER_BYTE);
        self.drain_all()?;
        self.sync()?;
        LogFileSaved { path: &self.path }.emit();
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), FileError> {
        let mut header = [0u8; HEADER_SIZE];
        {
            let mut buf = &mut header[..];
            buf.put_slice(&FILE_MAGIC);
            buf.put_slice(&self.endian.tag());
            buf.put_u8(FORMAT_VERSION);
            buf.put_slice(&self.installation_id);
            buf.put_u8(WORD_COUNT);
        }

        // One attempt; a short or failed write leaves the remnant at the
        // front of the buffer so the file still comes out well-formed once
        // draining resumes.
        let written = match self.file.write(&header) {
            Ok(n) => n,
            Err(error) if is_out_of_space(&error) => {
                warn!(message = "Header write failed, clearing space.", error = %error);
                let _ = archive::delete_oldest(&self.root);
                0
            }
            Err(source) => return Err(IoSnafu { path: &self.path }.into_error(source)),
        };
        if written < HEADER_SIZE {
            warn!(
                message = "Header incomplete, buffering remainder.",
                written = %written,
                header = %HEADER_SIZE,
            );
            self.buf.extend_from_slice(&header[written..]);
        }
        self.sync()
    }

    fn drain_all(&mut self) -> Result<(), FileError> {
        let mut written = 0;
        while written < self.buf.len() {
            written += self.write_some(written)?;
        }
        self.buf.clear();
        Ok(())
    }

    /// One `write` of everything buffered from `from` on, retrying after
    /// space reclamation. Returns the number of bytes accepted.
    fn write_some(&mut self, from: usize) -> Result<usize, FileError> {
        loop {
            match self.file.write(&self.buf[from..]) {
                Ok(0) => {
                    let refused = io::Error::new(ErrorKind::WriteZero, "file accepted no bytes");
                    return Err(IoSnafu { path: &self.path }.into_error(refused));
                }
                Ok(n) => return Ok(n),
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(error) if is_out_of_space(&error) => {
                    warn!(message = "Write failed, clearing space.", error = %error);
                    if archive::delete_oldest(&self.root).is_err() {
                        return Err(IoSnafu { path: &self.path }.into_error(error));
                    }
                }
                Err(source) => return Err(IoSnafu { path: &self.path }.into_error(source)),
            }
        }
    }

    fn sync(&self) -> Result<(), FileError> {
        loop {
            match self.file.sync_all() {
                Ok(()) => return Ok(()),
                Err(error) if is_out_of_space(&error) => {
                    warn!(message = "File sync failed, clearing space.", error = %error);
                    if archive::delete_oldest(&self.root).is_err() {
                        return Err(IoSnafu { path: &self.path }.into_error(error));
                    }
                }
                Err(source) => return Err(IoSnafu { path: &self.path }.into_error(source)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entry::Timestamp,
        params::{ParameterIndex, ParameterStore},
    };

    fn bucket() -> Bucket {
        Timestamp {
            year: 2024,
            month: 3,
            day: 15,
            hour: 10,
            minute: 27,
            ..Timestamp::default()
        }
        .bucket()
    }

    fn params() -> ParameterStore {
        let params = ParameterStore::new();
        let id: Vec<u8> = (0x10..0x20).collect();
        params.write(ParameterIndex::InstallationId, &id).unwrap();
        params
    }

    #[test]
    fn header_and_trailer_bracket_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let params = params();

        let log = LogFile::open(dir.path(), bucket(), &params, Endian::Big).unwrap();
        let path = log.path.clone();
        log.finish().unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 1);
        assert_eq!(&bytes[..4], &FILE_MAGIC);
        assert_eq!(&bytes[4..7], &Endian::Big.tag());
        assert_eq!(bytes[7], FORMAT_VERSION);
        assert_eq!(&bytes[8..24], &(0x10..0x20).collect::<Vec<u8>>()[..]);
        assert_eq!(bytes[24], WORD_COUNT);
        assert_eq!(bytes[25], TRAILER_BYTE);
        assert!(path.ends_with("20240315/10-20.bin"));
    }

    #[test]
    fn collisions_take_numbered_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let params = params();

        let first = LogFile::open(dir.path(), bucket(), &params, Endian::Big).unwrap();
        let second = LogFile::open(dir.path(), bucket(), &params, Endian::Big).unwrap();
        assert!(first.path.ends_with("10-20.bin"));
        assert!(second.path.ends_with("10-20_2.bin"));

        // With all nine names taken the open gives up.
        for n in 3..=9 {
            fs::write(
                dir.path().join(format!("20240315/10-20_{n}.bin")),
                b"taken",
            )
            .unwrap();
        }
        let err = LogFile::open(dir.path(), bucket(), &params, Endian::Big).unwrap_err();
        assert!(matches!(err, FileError::CollisionsExhausted { .. }));

        // Existing files were not clobbered.
        let untouched = fs::read(dir.path().join("20240315/10-20_3.bin")).unwrap();
        assert_eq!(untouched, b"taken");
    }

    #[test]
    fn drain_keeps_short_residue_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let params = params();

        let mut log = LogFile::open(dir.path(), bucket(), &params, Endian::Big).unwrap();
        let path = log.path.clone();
        log.push_entry(&[0x33u8; ENTRY_SIZE]);
        log.drain().unwrap();

        // One framed entry is far below the minimum write size, so nothing
        // beyond the header has hit the disk yet.
        assert_eq!(fs::read(&path).unwrap().len(), HEADER_SIZE);
        assert_eq!(log.buffered(), ENTRY_SIZE + 1);

        log.finish().unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 1 + ENTRY_SIZE + 1);
        assert_eq!(bytes[HEADER_SIZE], FRAME_BYTE);
        assert_eq!(*bytes.last().unwrap(), TRAILER_BYTE);
    }

    #[test]
    fn buffer_pressure_is_reached_before_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let params = params();

        let mut log = LogFile::open(dir.path(), bucket(), &params, Endian::Big).unwrap();
        let mut pushed = 0;
        while log.can_accept() {
            log.push_entry(&[0u8; ENTRY_SIZE]);
            pushed += 1;
        }
        assert_eq!(pushed, FILE_BUFFER_SIZE / (ENTRY_SIZE + 1));
        assert!(log.buffered() <= FILE_BUFFER_SIZE);
        log.finish().unwrap();
    }
}
