//! Field-bus data logger core.
//!
//! Cyclic process data pushed by a controller arrives on a hard real-time
//! fieldbus thread, crosses a bounded SPSC ring to a dedicated writer thread,
//! and lands in 10-minute binary files grouped by day. Completed days are
//! compressed into `YYYYMMDD.tgz` archives by a low-priority worker that also
//! deletes the oldest archives when the log volume runs short on space.
//!
//! The fieldbus protocol stack, device configuration and the CLI live
//! outside this crate; they deliver `(timestamp, variable_bytes)` through
//! [`IngestHandle::ingest`] and controller parameters through
//! [`ParameterStore::write_raw`], and nothing else.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[macro_use]
extern crate tracing;

pub mod archive;
pub mod common;
pub mod entry;
pub mod ingest;
mod internal_events;
pub mod params;
mod sched;
pub mod storage;
pub mod topology;
mod writer;

pub use self::{
    archive::{delete_oldest, ArchiveError, Archiver},
    common::LoggerConfig,
    entry::{Bucket, Date, Endian, Entry, Timestamp, ENTRY_SIZE, VARIABLE_DATA_SIZE},
    ingest::IngestHandle,
    params::{ParameterError, ParameterIndex, ParameterStore},
    topology::{Logger, StartError},
    writer::file::{FILE_MAGIC, FORMAT_VERSION, FRAME_BYTE, HEADER_SIZE, TRAILER_BYTE},
};
