//! Day archiving and disk-space retention.
//!
//! Once the writer moves on to a new day, the finished day's directory is
//! compressed into `YYYYMMDD.tgz` and removed. The archiver also enforces
//! the free-space floor: before compressing it deletes the oldest archives
//! until the log volume has room again. It runs at the default scheduling
//! policy so a large day never steals time from logging.
//!
//! Archives are plain gzip-wrapped tarballs with member paths rooted at
//! `YYYYMMDD/`, interchangeable with `tar -czf YYYYMMDD.tgz YYYYMMDD`.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};
use snafu::{ResultExt, Snafu};

use crate::{
    common::FREE_SPACE_PERCENT,
    entry::Date,
    internal_events::{ArchiveDeleted, ArchiveFailed, DayArchived, InternalEvent},
    sched, storage,
};

/// Error raised by archiving and retention operations.
#[derive(Debug, Snafu)]
pub enum ArchiveError {
    /// Space reclamation found nothing left to sacrifice.
    #[snafu(display("no archives available to delete"))]
    NoArchives,

    #[snafu(display("failed to scan {}: {source}", path.display()))]
    Scan { path: PathBuf, source: io::Error },

    #[snafu(display("failed to compress {}: {source}", path.display()))]
    Compress { path: PathBuf, source: io::Error },

    #[snafu(display("failed to delete {}: {source}", path.display()))]
    Delete { path: PathBuf, source: io::Error },
}

/// Compresses completed day directories and keeps the log volume's free
/// space above its floor.
#[derive(Clone, Debug)]
pub struct Archiver {
    root: PathBuf,
    free_space_percent: u64,
}

impl Archiver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Archiver {
            root: root.into(),
            free_space_percent: FREE_SPACE_PERCENT,
        }
    }

    /// Overrides the free-space floor. Zero disables reclamation.
    pub fn free_space_percent(mut self, percent: u64) -> Self {
        self.free_space_percent = percent;
        self
    }

    /// Archiver thread body for the day that just completed.
    ///
    /// Reclaims space first, then compresses every day directory dated at or
    /// before `day`, including days left behind by earlier failed runs. A
    /// directory that fails to compress is left intact for the next attempt.
    pub fn run(&self, day: Date) {
        sched::demote_to_normal();
        self.reclaim_space();

        let days = match storage::pending_day_dirs(&self.root) {
            Ok(days) => days,
            Err(error) => {
                error!(message = "Failed to scan log directory.", %error);
                return;
            }
        };
        for date in days.into_iter().filter(|date| *date <= day) {
            match self.compress_day(date) {
                Ok(archive) => DayArchived { archive: &archive }.emit(),
                Err(error) => ArchiveFailed {
                    error: error.to_string(),
                }
                .emit(),
            }
        }
    }

    /// Compresses one day directory into `YYYYMMDD.tgz` and deletes the
    /// directory on success.
    ///
    /// # Errors
    ///
    /// Fails if the archive cannot be produced or the directory cannot be
    /// removed afterwards; the directory's files are only deleted once the
    /// archive is complete and synced.
    pub fn compress_day(&self, date: Date) -> Result<PathBuf, ArchiveError> {
        let dir_name = storage::day_dir_name(date);
        let day_path = self.root.join(&dir_name);
        let archive_path = self.root.join(storage::archive_file_name(date));
        info!(message = "Archiving day directory.", directory = %day_path.display());

        let file = File::create(&archive_path).context(CompressSnafu {
            path: &archive_path,
        })?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder
            .append_dir_all(&dir_name, &day_path)
            .context(CompressSnafu {
                path: &archive_path,
            })?;
        let encoder = builder.into_inner().context(CompressSnafu {
            path: &archive_path,
        })?;
        let file = encoder.finish().context(CompressSnafu {
            path: &archive_path,
        })?;
        file.sync_all().context(CompressSnafu {
            path: &archive_path,
        })?;

        remove_day_dir(&day_path)?;
        Ok(archive_path)
    }

    /// Deletes the oldest archives until the volume's free-block percentage
    /// is back above the floor, or nothing deletable remains.
    fn reclaim_space(&self) {
        while let Some(free) = self.free_blocks_percent() {
            if free >= self.free_space_percent {
                break;
            }
            info!(
                message = "Log volume low on space, clearing.",
                free_percent = %free,
                floor_percent = %self.free_space_percent,
            );
            if delete_oldest(&self.root).is_err() {
                break;
            }
        }
    }

    #[cfg(unix)]
    // fsblkcnt_t is narrower than u64 on some platforms.
    #[allow(clippy::unnecessary_cast)]
    fn free_blocks_percent(&self) -> Option<u64> {
        match nix::sys::statvfs::statvfs(&self.root) {
            Ok(vfs) => {
                let blocks = vfs.blocks() as u64;
                let free = vfs.blocks_free() as u64;
                (blocks > 0).then(|| free * 100 / blocks)
            }
            Err(error) => {
                warn!(message = "Failed to stat log volume.", %error);
                None
            }
        }
    }

    #[cfg(not(unix))]
    fn free_blocks_percent(&self) -> Option<u64> {
        None
    }
}

/// Deletes the oldest day archive under `root`.
///
/// "Oldest" is the lexicographically smallest `YYYYMMDD.tgz` name, which is
/// also the chronologically earliest. Callable from the writer under
/// out-of-space pressure as well as from the archiver's reclamation loop.
///
/// # Errors
///
/// Fails if the root cannot be scanned, no archive exists, or the unlink
/// itself fails.
pub fn delete_oldest(root: &Path) -> Result<PathBuf, ArchiveError> {
    let dates = storage::archive_dates(root).context(ScanSnafu { path: root })?;
    let Some(oldest) = dates.first() else {
        warn!("Nothing to delete under space pressure.");
        return Err(ArchiveError::NoArchives);
    };

    let path = root.join(storage::archive_file_name(*oldest));
    fs::remove_file(&path).context(DeleteSnafu { path: &path })?;
    ArchiveDeleted { archive: &path }.emit();
    Ok(path)
}

/// Deletes every regular file in a freshly archived day directory, then the
/// directory itself. Individual file failures are logged and skipped so one
/// stubborn file does not strand the rest.
fn remove_day_dir(path: &Path) -> Result<(), ArchiveError> {
    for entry in fs::read_dir(path).context(ScanSnafu { path })? {
        let entry = entry.context(ScanSnafu { path })?;
        if let Err(error) = fs::remove_file(entry.path()) {
            warn!(
                message = "Failed to delete archived file.",
                path = %entry.path().display(),
                %error,
            );
        }
    }
    fs::remove_dir(path).context(DeleteSnafu { path })?;
    Ok(())
}
