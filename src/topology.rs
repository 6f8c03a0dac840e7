//! Wiring the pipeline together.
//!
//! [`Logger::start`] builds the ring, spawns the writer thread and hands the
//! producer endpoint back to the caller. Everything is constructed eagerly at
//! wire-up; the threads then run for the process lifetime, or until
//! [`Logger::stop`] drains and joins them.

use std::{
    io,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use pnlogger_ring::EntryRing;
use snafu::{ResultExt, Snafu};

use crate::{
    common::{LoggerConfig, ENTRY_RING_SLOTS},
    entry::ENTRY_SIZE,
    ingest::IngestHandle,
    params::ParameterStore,
    storage,
    writer::LogWriter,
};

/// Error starting the logger.
#[derive(Debug, Snafu)]
pub enum StartError {
    #[snafu(display("failed to create storage root {}: {source}", path.display()))]
    CreateRoot { path: PathBuf, source: io::Error },

    #[snafu(display("failed to spawn log writer thread: {source}"))]
    SpawnWriter { source: io::Error },
}

/// Handle to the running pipeline. Dropping it stops the threads.
#[derive(Debug)]
pub struct Logger {
    shutdown: Arc<AtomicBool>,
    writer: Option<JoinHandle<()>>,
}

impl Logger {
    /// Starts the pipeline: creates the storage root, builds the entry ring
    /// and spawns the writer thread.
    ///
    /// The returned [`IngestHandle`] goes to the fieldbus layer; the
    /// [`Logger`] stays with whoever owns the process lifecycle.
    ///
    /// # Errors
    ///
    /// Fails if the storage root cannot be created or the writer thread
    /// cannot be spawned.
    pub fn start(
        config: LoggerConfig,
        params: Arc<ParameterStore>,
    ) -> Result<(IngestHandle, Logger), StartError> {
        storage::ensure_root(&config.data_dir).context(CreateRootSnafu {
            path: &config.data_dir,
        })?;

        let (producer, consumer) = EntryRing::new(ENTRY_SIZE, ENTRY_RING_SLOTS);
        let shutdown = Arc::new(AtomicBool::new(false));
        let endian = config.endian;

        let writer = LogWriter::new(consumer, config, params, Arc::clone(&shutdown));
        let writer = thread::Builder::new()
            .name("pnlogger-writer".into())
            .spawn(move || writer.run())
            .context(SpawnWriterSnafu)?;

        info!("Logger started.");
        Ok((
            IngestHandle::new(producer, endian),
            Logger {
                shutdown,
                writer: Some(writer),
            },
        ))
    }

    /// Requests shutdown and waits for the writer to drain the ring, finish
    /// the open file and join any in-flight archiver.
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        if let Some(writer) = self.writer.take() {
            self.shutdown.store(true, Ordering::Relaxed);
            if writer.join().is_err() {
                error!("Log writer thread panicked.");
            }
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.stop_inner();
    }
}
