use std::path::PathBuf;

use flowweave_core::{ExportFileSource, Ports, RecordSource, SourceError};

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

fn fixture_path() -> PathBuf {
    repo_root().join("tests").join("data").join("flows_raw.csv")
}

#[test]
fn export_source_reads_records_and_counts_skips() {
    let mut source = ExportFileSource::open(&fixture_path()).unwrap();

    let mut records = Vec::new();
    while let Some(record) = source.next_record().unwrap() {
        records.push(record);
    }

    assert_eq!(records.len(), 10);
    assert_eq!(source.skipped(), 1);
}

#[test]
fn export_source_normalizes_cells() {
    let mut source = ExportFileSource::open(&fixture_path()).unwrap();
    let first = source.next_record().unwrap().expect("first record");

    assert_eq!(first.src_addr, "127.0.0.1");
    assert_eq!(first.dst_addr, "1.1.1.1");
    assert_eq!(first.ports, Ports::Tcp { src: 443, dst: 51234 });
    assert_eq!(first.protocol, "TCP");
    assert_eq!(first.frame_len, 1500);
}

#[test]
fn export_source_rejects_missing_file() {
    let path = repo_root()
        .join("tests")
        .join("data")
        .join("does_not_exist.csv");
    let err = match ExportFileSource::open(&path) {
        Ok(_) => panic!("expected missing file to be rejected"),
        Err(err) => err,
    };
    assert!(matches!(err, SourceError::Io(_)));
}
