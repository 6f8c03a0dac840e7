//! The log writer thread.
//!
//! The writer is the single consumer of the entry ring. Each iteration it
//! moves as many entries as fit into the current file's buffer, rolling to a
//! new file whenever an entry's 10-minute bucket differs from the open one,
//! then drains the buffer to disk and sleeps. Crossing a day boundary hands
//! the finished day to an archiver thread; the day is captured by value at
//! spawn, so the writer only waits for the spawn itself.
//!
//! The loop has three effective states: no open file, an open file accepting
//! entries, and an open file whose buffer is full (draining only, ring
//! entries stay queued). Persistent write errors abandon the open file and
//! the next entry starts a fresh one.

pub(crate) mod file;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use pnlogger_ring::Consumer;

use crate::{
    archive::Archiver,
    common::{LoggerConfig, FILE_BUFFER_SIZE},
    entry::{Bucket, Date, Timestamp, ENTRY_HEAD_SIZE, ENTRY_SIZE},
    internal_events::{EntryWritten, InternalEvent, LogFileAbandoned},
    params::ParameterStore,
    sched,
    writer::file::LogFile,
};

pub(crate) struct LogWriter {
    consumer: Consumer,
    config: LoggerConfig,
    params: Arc<ParameterStore>,
    shutdown: Arc<AtomicBool>,
    current: Option<LogFile>,
    archive_workers: Vec<JoinHandle<()>>,
}

impl LogWriter {
    pub(crate) fn new(
        consumer: Consumer,
        config: LoggerConfig,
        params: Arc<ParameterStore>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        LogWriter {
            consumer,
            config,
            params,
            shutdown,
            current: None,
            archive_workers: Vec::new(),
        }
    }

    /// Thread body. Runs until shutdown is requested and the ring is empty,
    /// then finishes the open file and joins any archiver still running.
    pub(crate) fn run(mut self) {
        sched::promote_to_fifo(sched::LOG_THREAD_PRIORITY);
        debug!("Logging thread active.");

        loop {
            self.poll();
            if self.shutdown.load(Ordering::Relaxed) && self.consumer.is_empty() {
                break;
            }
            thread::sleep(self.config.poll_interval);
        }

        if let Some(log) = self.current.take() {
            if let Err(error) = log.finish() {
                error!(message = "Failed to finish log file on shutdown.", %error);
            }
        }
        for worker in self.archive_workers.drain(..) {
            let _ = worker.join();
        }
        debug!("Logging thread stopped.");
    }

    /// One iteration: move entries from the ring into the file buffer, then
    /// push a chunk of the buffer to disk.
    fn poll(&mut self) {
        let mut head = [0u8; ENTRY_HEAD_SIZE];
        while self.consumer.peek_head(&mut head).is_ok() {
            let ts = Timestamp::decode_head(&head, self.config.endian);
            let bucket = ts.bucket();

            if self.current.as_ref().map(|log| log.bucket()) != Some(bucket) && !self.roll_to(bucket)
            {
                break;
            }
            let log = self
                .current
                .as_mut()
                .expect("roll_to leaves a file open on success");

            if !log.can_accept() {
                // Nothing is lost yet, but the buffer must shrink before any
                // more entries can be copied out of the ring.
                warn!(
                    message = "File buffer running low, leaving entries queued.",
                    buffered = %log.buffered(),
                    buffer_capacity = %FILE_BUFFER_SIZE,
                    queued = %self.consumer.len(),
                    ring_capacity = %self.consumer.capacity(),
                );
                break;
            }

            let mut entry = [0u8; ENTRY_SIZE];
            if self.consumer.try_pop(&mut entry).is_err() {
                break;
            }
            log.push_entry(&entry);
            EntryWritten.emit();
        }

        if let Some(log) = self.current.as_mut() {
            if let Err(error) = log.drain() {
                LogFileAbandoned {
                    error: error.to_string(),
                }
                .emit();
                self.current = None;
            }
        }
    }

    /// Finishes the current file (if any) and opens one for `bucket`.
    ///
    /// Returns `false` when the new file could not be opened; the triggering
    /// entry stays in the ring and the next iteration retries.
    fn roll_to(&mut self, bucket: Bucket) -> bool {
        if let Some(log) = self.current.take() {
            let finished = log.bucket();
            if let Err(error) = log.finish() {
                error!(message = "Failed to finish log file.", %error);
            }
            if finished.date() != bucket.date() {
                self.spawn_archiver(finished.date());
            }
        }

        match LogFile::open(
            &self.config.data_dir,
            bucket,
            &self.params,
            self.config.endian,
        ) {
            Ok(log) => {
                self.current = Some(log);
                true
            }
            Err(error) => {
                warn!(message = "Failed to start log file, will retry.", %error);
                false
            }
        }
    }

    /// Hands a completed day to a background archiver. The date is moved
    /// into the new thread, so the writer continues immediately after spawn.
    fn spawn_archiver(&mut self, day: Date) {
        self.archive_workers.retain(|worker| !worker.is_finished());

        let archiver = Archiver::new(self.config.data_dir.clone())
            .free_space_percent(self.config.free_space_percent);
        match thread::Builder::new()
            .name("pnlogger-archive".into())
            .spawn(move || archiver.run(day))
        {
            Ok(worker) => self.archive_workers.push(worker),
            Err(error) => error!(message = "Failed to spawn archiver thread.", %error),
        }
    }
}
