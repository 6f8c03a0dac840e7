//! End-to-end scenarios: ingest through the public handles, stop, then
//! assert on the bytes that reached the storage root.

use std::{fs, path::Path, sync::Arc};

use pnlogger::{
    Bucket, Endian, Entry, IngestHandle, Logger, LoggerConfig, ParameterIndex, ParameterStore,
    Timestamp, ENTRY_SIZE, FILE_MAGIC, FRAME_BYTE, HEADER_SIZE, TRAILER_BYTE, VARIABLE_DATA_SIZE,
};
use pnlogger_ring::EntryRing;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config(root: &Path) -> LoggerConfig {
    // Reclamation off so a busy CI disk cannot make the archiver eat the
    // archives these tests assert on.
    LoggerConfig::from_path(root).free_space_percent(0).build()
}

fn test_params() -> Arc<ParameterStore> {
    let params = ParameterStore::new();
    let id: Vec<u8> = (0x10..0x20).collect();
    params.write(ParameterIndex::InstallationId, &id).unwrap();
    Arc::new(params)
}

fn ts(day: u8, hour: u8, minute: u8, second: u8) -> Timestamp {
    Timestamp {
        year: 2024,
        month: 3,
        day,
        weekday: 5,
        hour,
        minute,
        second,
        nanosecond: 0,
    }
}

fn sequential_words() -> [u8; VARIABLE_DATA_SIZE] {
    let mut words = [0u8; VARIABLE_DATA_SIZE];
    for (i, w) in words.iter_mut().enumerate() {
        *w = (i + 1) as u8;
    }
    words
}

/// Splits a finished file into its header, decoded entries and trailer flag.
fn parse_file(bytes: &[u8]) -> (Vec<u8>, Vec<Entry>, bool) {
    let header = bytes[..HEADER_SIZE].to_vec();
    let endian = Endian::from_tag(&header[4..7]).expect("recognizable endian tag");
    let mut entries = Vec::new();
    let mut rest = &bytes[HEADER_SIZE..];
    while rest.len() > 1 {
        assert_eq!(rest[0], FRAME_BYTE);
        entries.push(Entry::decode(&rest[1..=ENTRY_SIZE], endian));
        rest = &rest[ENTRY_SIZE + 1..];
    }
    let clean = rest == [TRAILER_BYTE];
    (header, entries, clean)
}

#[test]
fn single_entry_produces_the_documented_bytes() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (mut ingest, logger) = Logger::start(test_config(dir.path()), test_params()).unwrap();

    assert!(ingest.ingest(&ts(15, 10, 27, 33), &sequential_words()));
    logger.stop();

    let bytes = fs::read(dir.path().join("20240315/10-20.bin")).unwrap();
    assert_eq!(bytes.len(), HEADER_SIZE + 1 + ENTRY_SIZE + 1);

    // Header: magic, "PNL", version 0, installation id, word count 0x40.
    assert_eq!(&bytes[..4], &FILE_MAGIC);
    assert_eq!(&bytes[4..7], &[0x50, 0x4E, 0x4C]);
    assert_eq!(bytes[7], 0x00);
    assert_eq!(&bytes[8..24], &(0x10..0x20).collect::<Vec<u8>>()[..]);
    assert_eq!(bytes[24], 0x40);

    // Body: one framed entry in big-endian, then the trailer.
    assert_eq!(bytes[25], FRAME_BYTE);
    assert_eq!(&bytes[26..28], &2024u16.to_be_bytes());
    assert_eq!(&bytes[28..34], &[3, 15, 5, 10, 27, 33]);
    assert_eq!(&bytes[34..38], &[0, 0, 0, 0]);
    assert_eq!(&bytes[38..166], &sequential_words()[..]);
    assert_eq!(bytes[166], TRAILER_BYTE);
}

#[test]
fn bucket_rollover_closes_one_file_per_bucket() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (mut ingest, logger) = Logger::start(test_config(dir.path()), test_params()).unwrap();

    let words = sequential_words();
    assert!(ingest.ingest(&ts(15, 10, 29, 59), &words));
    assert!(ingest.ingest(&ts(15, 10, 30, 0), &words));
    logger.stop();

    let first = fs::read(dir.path().join("20240315/10-20.bin")).unwrap();
    let second = fs::read(dir.path().join("20240315/10-30.bin")).unwrap();

    let (_, entries, clean) = parse_file(&first);
    assert!(clean, "rolled file must end with the trailer");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].timestamp, ts(15, 10, 29, 59));

    let (_, entries, clean) = parse_file(&second);
    assert!(clean);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].timestamp, ts(15, 10, 30, 0));
}

#[test]
fn entries_round_trip_in_order() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (mut ingest, logger) = Logger::start(test_config(dir.path()), test_params()).unwrap();

    let mut sent = Vec::new();
    for second in 0..40u8 {
        let timestamp = ts(15, 10, 22, second);
        let mut words = sequential_words();
        words[0] = second;
        assert!(ingest.ingest(&timestamp, &words));
        sent.push(Entry { timestamp, words });
    }
    logger.stop();

    let bytes = fs::read(dir.path().join("20240315/10-20.bin")).unwrap();
    let (_, entries, clean) = parse_file(&bytes);
    assert!(clean);
    assert_eq!(entries, sent);

    // All entries of the file share its bucket and never step backwards.
    let bucket = entries[0].timestamp.bucket();
    for pair in entries.windows(2) {
        assert_eq!(pair[1].timestamp.bucket(), bucket);
        assert!(
            (pair[0].timestamp.hour, pair[0].timestamp.minute, pair[0].timestamp.second)
                <= (pair[1].timestamp.hour, pair[1].timestamp.minute, pair[1].timestamp.second)
        );
    }
}

#[test]
fn day_rollover_archives_the_finished_day() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (mut ingest, logger) = Logger::start(test_config(dir.path()), test_params()).unwrap();

    let words = sequential_words();
    assert!(ingest.ingest(&ts(15, 23, 59, 59), &words));
    assert!(ingest.ingest(&ts(16, 0, 0, 1), &words));
    logger.stop();

    // The completed day is a tarball now, the new day an ordinary directory.
    assert!(dir.path().join("20240315.tgz").exists());
    assert!(!dir.path().join("20240315").exists());

    let bytes = fs::read(dir.path().join("20240316/00-00.bin")).unwrap();
    let (_, entries, clean) = parse_file(&bytes);
    assert!(clean);
    assert_eq!(entries[0].timestamp, ts(16, 0, 0, 1));

    // The archive opens with a standard extractor and holds the day's file.
    let gz = flate2::read::GzDecoder::new(fs::File::open(dir.path().join("20240315.tgz")).unwrap());
    let mut archive = tar::Archive::new(gz);
    let mut member_bytes = None;
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path().unwrap().to_string_lossy() == "20240315/23-50.bin" {
            let mut contents = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut contents).unwrap();
            member_bytes = Some(contents);
        }
    }
    let member_bytes = member_bytes.expect("archive holds the bucket file");
    let (_, entries, clean) = parse_file(&member_bytes);
    assert!(clean);
    assert_eq!(entries[0].timestamp, ts(15, 23, 59, 59));
}

#[test]
fn resuming_a_root_never_disturbs_existing_files() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let words = sequential_words();

    let (mut ingest, logger) = Logger::start(test_config(dir.path()), test_params()).unwrap();
    assert!(ingest.ingest(&ts(15, 10, 27, 33), &words));
    logger.stop();
    let original = fs::read(dir.path().join("20240315/10-20.bin")).unwrap();

    // New bucket: a second run adds a file alongside the first.
    let (mut ingest, logger) = Logger::start(test_config(dir.path()), test_params()).unwrap();
    assert!(ingest.ingest(&ts(15, 10, 31, 0), &words));
    logger.stop();
    assert!(dir.path().join("20240315/10-30.bin").exists());
    assert_eq!(
        fs::read(dir.path().join("20240315/10-20.bin")).unwrap(),
        original
    );

    // Same bucket: exclusive create pushes the third run to a suffixed name.
    let (mut ingest, logger) = Logger::start(test_config(dir.path()), test_params()).unwrap();
    assert!(ingest.ingest(&ts(15, 10, 25, 0), &words));
    logger.stop();
    assert!(dir.path().join("20240315/10-20_2.bin").exists());
    assert_eq!(
        fs::read(dir.path().join("20240315/10-20.bin")).unwrap(),
        original
    );
}

#[test]
fn overflow_loss_is_bounded_and_recovery_is_clean() {
    init_tracing();
    // A free-standing ring plays the part of a paused writer.
    let (producer, mut consumer) = EntryRing::new(ENTRY_SIZE, 256);
    let mut ingest = IngestHandle::new(producer, Endian::Big);
    let words = sequential_words();

    let mut enqueued = 0u32;
    let mut dropped = 0u32;
    for i in 0..1000u32 {
        let timestamp = ts(15, 10, (i % 60) as u8 / 10, (i % 60) as u8);
        if ingest.ingest(&timestamp, &words) {
            enqueued += 1;
        } else {
            dropped += 1;
        }
    }
    assert_eq!(enqueued, 255);
    assert_eq!(dropped, 745);

    // One slot freed, one push accepted: the burst is over.
    let mut out = [0u8; ENTRY_SIZE];
    consumer.try_pop(&mut out).unwrap();
    assert!(ingest.ingest(&ts(15, 10, 45, 0), &words));
}

#[test]
fn uninitialized_clock_entries_never_reach_disk() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (mut ingest, logger) = Logger::start(test_config(dir.path()), test_params()).unwrap();

    let uninitialized = Timestamp::default();
    assert!(!ingest.ingest(&uninitialized, &sequential_words()));
    logger.stop();

    // Nothing was written: the root holds no day directory at all.
    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert!(names.is_empty(), "unexpected entries: {names:?}");
}

#[test]
fn header_uses_the_id_snapshot_from_open_time() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let params = test_params();
    let (mut ingest, logger) = Logger::start(test_config(dir.path()), Arc::clone(&params)).unwrap();

    let words = sequential_words();
    assert!(ingest.ingest(&ts(15, 10, 27, 33), &words));

    // Wait for the writer to open the file, then change the parameter; the
    // already-open file keeps the id it was opened with.
    let first_path = dir.path().join("20240315/10-20.bin");
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !first_path.exists() {
        assert!(std::time::Instant::now() < deadline, "writer never opened the file");
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    params
        .write(ParameterIndex::InstallationId, &[0xEEu8; 16])
        .unwrap();
    assert!(ingest.ingest(&ts(15, 10, 31, 0), &words));
    logger.stop();

    let first = fs::read(dir.path().join("20240315/10-20.bin")).unwrap();
    assert_eq!(&first[8..24], &(0x10..0x20).collect::<Vec<u8>>()[..]);

    let second = fs::read(dir.path().join("20240315/10-30.bin")).unwrap();
    assert_eq!(&second[8..24], &[0xEEu8; 16]);
}

#[test]
fn buckets_map_to_expected_file_names() {
    // Pure naming sanity used by the scenarios above.
    let bucket: Bucket = ts(15, 9, 7, 0).bucket();
    assert_eq!(bucket.start_minute(), 0);
    let bucket: Bucket = ts(15, 9, 59, 0).bucket();
    assert_eq!(bucket.start_minute(), 50);
}
