//! Storage layout: where files live and what they are called.
//!
//! Everything under the configured root is either a `YYYYMMDD/` directory (a
//! day still being written, holding `HH-MM.bin` bucket files) or a
//! `YYYYMMDD.tgz` archive (a completed, compressed day). The fixed-width,
//! zero-padded names make lexicographic and chronological order coincide.

use std::{fs, io, path::Path, sync::LazyLock};

use regex::Regex;

use crate::entry::{Bucket, Date};

static DAY_DIR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").unwrap());

static ARCHIVE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})\.tgz$").unwrap());

pub fn day_dir_name(date: Date) -> String {
    format!("{:04}{:02}{:02}", date.year, date.month, date.day)
}

pub fn archive_file_name(date: Date) -> String {
    format!("{}.tgz", day_dir_name(date))
}

/// File name for a bucket, with the optional collision suffix (`_2`..`_9`).
pub fn bucket_file_name(bucket: Bucket, attempt: Option<u8>) -> String {
    match attempt {
        None => format!("{:02}-{:02}.bin", bucket.hour, bucket.start_minute()),
        Some(n) => format!("{:02}-{:02}_{}.bin", bucket.hour, bucket.start_minute(), n),
    }
}

pub fn parse_day_dir_name(name: &str) -> Option<Date> {
    parse_date(&DAY_DIR_NAME, name)
}

pub fn parse_archive_name(name: &str) -> Option<Date> {
    parse_date(&ARCHIVE_NAME, name)
}

fn parse_date(pattern: &Regex, name: &str) -> Option<Date> {
    let captures = pattern.captures(name)?;
    // The captures are fixed runs of digits, so the parses cannot fail.
    Some(Date {
        year: captures[1].parse().ok()?,
        month: captures[2].parse().ok()?,
        day: captures[3].parse().ok()?,
    })
}

/// Creates the storage root if it does not exist yet.
///
/// # Errors
///
/// Propagates the underlying I/O error when creation fails.
pub fn ensure_root(root: &Path) -> io::Result<()> {
    fs::create_dir_all(root)
}

/// Dates of all day directories below `root`, oldest first.
///
/// # Errors
///
/// Propagates the underlying I/O error when the root cannot be scanned.
pub fn pending_day_dirs(root: &Path) -> io::Result<Vec<Date>> {
    scan(root, |entry, name| {
        entry.file_type().is_ok_and(|ty| ty.is_dir())
            .then(|| parse_day_dir_name(name))
            .flatten()
    })
}

/// Dates of all day archives below `root`, oldest first.
///
/// # Errors
///
/// Propagates the underlying I/O error when the root cannot be scanned.
pub fn archive_dates(root: &Path) -> io::Result<Vec<Date>> {
    scan(root, |entry, name| {
        entry.file_type().is_ok_and(|ty| ty.is_file())
            .then(|| parse_archive_name(name))
            .flatten()
    })
}

fn scan(
    root: &Path,
    recognize: impl Fn(&fs::DirEntry, &str) -> Option<Date>,
) -> io::Result<Vec<Date>> {
    let mut dates = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(date) = recognize(&entry, name) {
            dates.push(date);
        }
    }
    dates.sort_unstable();
    Ok(dates)
}
