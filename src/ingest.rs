//! The ingest endpoint.
//!
//! [`IngestHandle::ingest`] runs on the fieldbus thread after every cyclic
//! update, so the fast path is a fixed-size serialization into a stack buffer
//! and one `try_push`. It never touches a file, never allocates, and never
//! waits on the writer. When the ring is full the entry is dropped and
//! counted; drop reports back off exponentially so a sustained overload does
//! not turn into a log storm of its own.

use pnlogger_ring::Producer;

use crate::{
    entry::{Endian, Timestamp, ENTRY_SIZE, VARIABLE_DATA_SIZE},
    internal_events::{EntryDropped, EntryEnqueued, IngestRecovered, InternalEvent},
};

/// First drop count that gets reported; later reports come at five times the
/// previous threshold.
const FIRST_REPORTED_DROP: u32 = 2;

/// Producer endpoint handed to the fieldbus layer.
#[derive(Debug)]
pub struct IngestHandle {
    producer: Producer,
    endian: Endian,
    drop_count: u32,
    next_reported_drop: u32,
}

impl IngestHandle {
    pub fn new(producer: Producer, endian: Endian) -> Self {
        IngestHandle {
            producer,
            endian,
            drop_count: 0,
            next_reported_drop: FIRST_REPORTED_DROP,
        }
    }

    /// Queues one cyclic update for logging.
    ///
    /// Returns whether the entry was enqueued. `false` means the entry was
    /// dropped, either because the controller clock is still uninitialized
    /// (`year == 0`) or because the ring is full; the drop is accounted for
    /// and reported, and the caller need not care further.
    pub fn ingest(&mut self, timestamp: &Timestamp, words: &[u8; VARIABLE_DATA_SIZE]) -> bool {
        if timestamp.year == 0 {
            warn!(
                message = "Entry timestamp looks uninitialized, ignoring.",
                var0 = %words[0],
                var1 = %words[1],
            );
            EntryDropped {
                reason: "uninitialized_clock",
            }
            .emit();
            return false;
        }

        let mut entry = [0u8; ENTRY_SIZE];
        timestamp.encode(self.endian, &mut entry[..12]);
        entry[12..].copy_from_slice(words);

        match self.producer.try_push(&entry) {
            Ok(()) => {
                if self.drop_count != 0 {
                    IngestRecovered {
                        dropped: self.drop_count,
                        hour: timestamp.hour,
                        minute: timestamp.minute,
                    }
                    .emit();
                    self.drop_count = 0;
                    self.next_reported_drop = FIRST_REPORTED_DROP;
                }
                EntryEnqueued.emit();
                true
            }
            Err(_) => {
                self.drop_count += 1;
                if self.drop_count >= self.next_reported_drop {
                    warn!(
                        message = "Entry buffer full, entries dropped.",
                        dropped = %self.drop_count,
                    );
                    self.next_reported_drop *= 5;
                }
                EntryDropped { reason: "ring_full" }.emit();
                false
            }
        }
    }
}
