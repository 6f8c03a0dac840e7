//! Telemetry for the pipeline, one event struct per occurrence worth
//! counting. Log lines that belong to an event are emitted here too, so call
//! sites stay free of formatting.

use std::path::Path;

use metrics::counter;

pub(crate) trait InternalEvent {
    fn emit(self);
}

pub(crate) struct EntryEnqueued;

impl InternalEvent for EntryEnqueued {
    fn emit(self) {
        counter!("ingest_entries_enqueued_total").increment(1);
    }
}

pub(crate) struct EntryDropped {
    pub reason: &'static str,
}

impl InternalEvent for EntryDropped {
    fn emit(self) {
        counter!("ingest_entries_dropped_total", "reason" => self.reason).increment(1);
    }
}

pub(crate) struct IngestRecovered {
    pub dropped: u32,
    pub hour: u8,
    pub minute: u8,
}

impl InternalEvent for IngestRecovered {
    fn emit(self) {
        warn!(
            message = "Recovered after dropped entries.",
            dropped = %self.dropped,
            hour = %self.hour,
            minute = %self.minute,
        );
        counter!("ingest_recoveries_total").increment(1);
    }
}

pub(crate) struct LogFileOpened<'a> {
    pub path: &'a Path,
}

impl InternalEvent for LogFileOpened<'_> {
    fn emit(self) {
        info!(message = "Started log file.", path = %self.path.display());
        counter!("writer_files_opened_total").increment(1);
    }
}

pub(crate) struct LogFileSaved<'a> {
    pub path: &'a Path,
}

impl InternalEvent for LogFileSaved<'_> {
    fn emit(self) {
        info!(message = "Saved log file.", path = %self.path.display());
        counter!("writer_files_saved_total").increment(1);
    }
}

pub(crate) struct LogFileAbandoned {
    pub error: String,
}

impl InternalEvent for LogFileAbandoned {
    fn emit(self) {
        error!(
            message = "Write failed, abandoning current log file.",
            error = %self.error,
        );
        counter!("writer_files_abandoned_total").increment(1);
    }
}

pub(crate) struct EntryWritten;

impl InternalEvent for EntryWritten {
    fn emit(self) {
        counter!("writer_entries_written_total").increment(1);
    }
}

pub(crate) struct DayArchived<'a> {
    pub archive: &'a Path,
}

impl InternalEvent for DayArchived<'_> {
    fn emit(self) {
        info!(message = "Archived day directory.", archive = %self.archive.display());
        counter!("archiver_days_archived_total").increment(1);
    }
}

pub(crate) struct ArchiveFailed {
    pub error: String,
}

impl InternalEvent for ArchiveFailed {
    fn emit(self) {
        error!(message = "Failed to archive day directory.", error = %self.error);
        counter!("archiver_failures_total").increment(1);
    }
}

pub(crate) struct ArchiveDeleted<'a> {
    pub archive: &'a Path,
}

impl InternalEvent for ArchiveDeleted<'_> {
    fn emit(self) {
        info!(message = "Deleted oldest archive.", archive = %self.archive.display());
        counter!("archiver_archives_deleted_total").increment(1);
    }
}
