use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::entry::Endian;

/// Number of slots in the entry ring. One slot stays reserved, so up to 255
/// entries can be in flight between the fieldbus thread and the writer.
pub const ENTRY_RING_SLOTS: usize = 256;

/// Size of the writer-side byte buffer sitting in front of the output file.
pub const FILE_BUFFER_SIZE: usize = 32768;

/// The writer only issues a `write` once at least this many bytes are
/// buffered, except when finishing a file.
pub const FILE_MIN_WRITE: usize = 4096;

/// Old archives are deleted while free blocks on the log volume are below
/// this percentage of the total.
pub const FREE_SPACE_PERCENT: u64 = 20;

pub const DEFAULT_DATA_DIR: &str = "/var/opt/pnlogger/data";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Logger configuration.
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    /// Root directory the logger writes under.
    ///
    /// Day directories and day archives are created directly below it; the
    /// directory itself is created at startup if missing.
    pub(crate) data_dir: PathBuf,
    /// Byte order entries and headers are written in.
    pub(crate) endian: Endian,
    /// How long the writer thread sleeps between drain iterations.
    pub(crate) poll_interval: Duration,
    /// Free-space floor, in percent of the volume's blocks, enforced by the
    /// archiver before compressing.
    pub(crate) free_space_percent: u64,
}

impl LoggerConfig {
    pub fn from_path<P>(data_dir: P) -> LoggerConfigBuilder
    where
        P: AsRef<Path>,
    {
        LoggerConfigBuilder {
            data_dir: data_dir.as_ref().to_path_buf(),
            endian: None,
            poll_interval: None,
            free_space_percent: None,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig::from_path(DEFAULT_DATA_DIR).build()
    }
}

/// Builder for [`LoggerConfig`].
#[derive(Debug)]
pub struct LoggerConfigBuilder {
    data_dir: PathBuf,
    endian: Option<Endian>,
    poll_interval: Option<Duration>,
    free_space_percent: Option<u64>,
}

impl LoggerConfigBuilder {
    /// Sets the byte order used for file headers and entry fields.
    ///
    /// Defaults to big-endian, which is also the order the controller sends
    /// timestamps in.
    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    /// Sets the writer thread's sleep between drain iterations.
    ///
    /// Defaults to 2 ms.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Sets the free-space floor, in percent of the log volume's blocks,
    /// below which the archiver deletes the oldest archives.
    ///
    /// Defaults to 20. Zero disables reclamation.
    pub fn free_space_percent(mut self, percent: u64) -> Self {
        self.free_space_percent = Some(percent);
        self
    }

    /// Consumes this builder and constructs a [`LoggerConfig`].
    pub fn build(self) -> LoggerConfig {
        LoggerConfig {
            data_dir: self.data_dir,
            endian: self.endian.unwrap_or_default(),
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            free_space_percent: self.free_space_percent.unwrap_or(FREE_SPACE_PERCENT),
        }
    }
}
