//! End-to-end tests: canonical database on disk, index build and
//! persistence, and the scan pipeline through the dispatcher.

use std::fs;
use std::path::{Path, PathBuf};

use snpscan_lib::dispatcher;
use snpscan_lib::kmer::encode_kmer;
use snpscan_lib::store::IndexFiles;
use snpscan_lib::{scan_stream, Database, Error, IndexParams};
use tempfile::TempDir;

const KMER_A: &str = "ACGTACGTACGTACGTACGTACGTACGTACG";
const KMER_B: &str = "TGCATGCATGCATGCATGCATGCATGCATGC";

fn params() -> IndexParams {
    IndexParams::new(12, 16).unwrap()
}

/// Serialize `(coord, offset, kmer)` triples as a canonical database.
fn canonical_bytes(records: &[(u64, u32, &str)]) -> Vec<u8> {
    let mut packed: Vec<(u64, u64)> = records
        .iter()
        .map(|&(coord, offset, kmer)| {
            ((coord << 8) | offset as u64, encode_kmer(kmer.as_bytes()))
        })
        .collect();
    packed.sort_by_key(|&(_, kmer)| kmer);

    let mut bytes = Vec::with_capacity(packed.len() * 16);
    for (snp_with_offset, kmer) in packed {
        bytes.extend_from_slice(&snp_with_offset.to_le_bytes());
        bytes.extend_from_slice(&kmer.to_le_bytes());
    }
    bytes
}

fn write_db(dir: &TempDir, records: &[(u64, u32, &str)]) -> PathBuf {
    let path = dir.path().join("snps.db");
    fs::write(&path, canonical_bytes(records)).unwrap();
    path
}

fn fastq(sequences: &[&str]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (i, seq) in sequences.iter().enumerate() {
        bytes.extend_from_slice(format!("@read{i}\n{seq}\n+\n").as_bytes());
        bytes.extend(std::iter::repeat(b'I').take(seq.len()));
        bytes.push(b'\n');
    }
    bytes
}

fn write_fastq(dir: &TempDir, name: &str, sequences: &[&str]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, fastq(sequences)).unwrap();
    path
}

fn scan(db: &Database, sequences: &[&str]) -> Vec<(u64, u64)> {
    let input = fastq(sequences);
    scan_stream(db, &input[..], Path::new("in.fastq"))
        .unwrap()
        .rows
}

#[test]
fn build_writes_all_index_files() {
    let dir = TempDir::new().unwrap();
    let db_path = write_db(&dir, &[(0x1234, 0, KMER_A)]);
    let db = Database::open(&db_path, params(), false).unwrap();

    let files = IndexFiles::for_db(&db_path, db.params());
    for path in [&files.snps, &files.kmer_index, &files.lmer_index, &files.bloom] {
        assert!(path.exists(), "{} was not persisted", path.display());
    }
    assert_eq!(scan(&db, &[KMER_A]), vec![(0x1234, 1)]);
}

#[test]
fn reload_uses_persisted_indices() {
    let dir = TempDir::new().unwrap();
    let db_path = write_db(&dir, &[(0x1234, 0, KMER_A), (2, 0, KMER_B)]);
    drop(Database::open(&db_path, params(), false).unwrap());

    // Overwrite the canonical database with same-sized unsorted garbage: a
    // rebuild would now fail, so a successful reopen proves every index was
    // loaded from disk.
    let garbage = canonical_bytes(&[(1, 0, KMER_B), (2, 0, KMER_A)]);
    let mut swapped = Vec::new();
    swapped.extend_from_slice(&garbage[16..32]);
    swapped.extend_from_slice(&garbage[0..16]);
    fs::write(&db_path, &swapped).unwrap();

    let db = Database::open(&db_path, params(), false).unwrap();
    assert_eq!(scan(&db, &[KMER_A]), vec![(0x1234, 1)]);
}

#[test]
fn preload_mode_matches_mapped_mode() {
    let dir = TempDir::new().unwrap();
    let db_path = write_db(&dir, &[(0x1234, 0, KMER_A), (7, 13, KMER_B)]);

    let mapped = Database::open(&db_path, params(), false).unwrap();
    let preloaded = Database::open(&db_path, params(), true).unwrap();

    for sequences in [&[KMER_A][..], &[KMER_B][..], &[KMER_A, KMER_B][..]] {
        assert_eq!(scan(&mapped, sequences), scan(&preloaded, sequences));
    }
}

#[test]
fn missing_bloom_is_rebuilt_alone() {
    let dir = TempDir::new().unwrap();
    let db_path = write_db(&dir, &[(0x1234, 0, KMER_A)]);
    drop(Database::open(&db_path, params(), false).unwrap());

    let files = IndexFiles::for_db(&db_path, &params());
    fs::remove_file(&files.bloom).unwrap();

    let db = Database::open(&db_path, params(), false).unwrap();
    assert!(files.bloom.exists());
    assert_eq!(scan(&db, &[KMER_A]), vec![(0x1234, 1)]);
}

#[test]
fn mis_sized_lmer_table_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    let db_path = write_db(&dir, &[(0x1234, 0, KMER_A)]);
    drop(Database::open(&db_path, params(), false).unwrap());

    let files = IndexFiles::for_db(&db_path, &params());
    fs::write(&files.lmer_index, [0u8; 24]).unwrap();

    let db = Database::open(&db_path, params(), false).unwrap();
    assert_eq!(
        fs::metadata(&files.lmer_index).unwrap().len(),
        (params().lmer_slots() * 8) as u64
    );
    assert_eq!(scan(&db, &[KMER_A]), vec![(0x1234, 1)]);
}

#[test]
fn stale_snp_table_is_rebuilt_with_the_index() {
    let dir = TempDir::new().unwrap();
    let db_path = write_db(&dir, &[(0x1234, 0, KMER_A), (0x9999, 4, KMER_B)]);
    drop(Database::open(&db_path, params(), false).unwrap());

    // Truncate the SNP table: its ids no longer cover the k-mer index.
    let files = IndexFiles::for_db(&db_path, &params());
    fs::write(&files.snps, b"").unwrap();

    let db = Database::open(&db_path, params(), false).unwrap();
    assert_eq!(
        scan(&db, &[KMER_A, KMER_B]),
        vec![(0x1234, 1), (0x9999, 1)]
    );
}

#[test]
fn different_widths_keep_separate_files() {
    let dir = TempDir::new().unwrap();
    let db_path = write_db(&dir, &[(0x1234, 0, KMER_A)]);

    drop(Database::open(&db_path, IndexParams::new(12, 16).unwrap(), false).unwrap());
    drop(Database::open(&db_path, IndexParams::new(11, 16).unwrap(), false).unwrap());

    let narrow = IndexFiles::for_db(&db_path, &IndexParams::new(11, 16).unwrap());
    let wide = IndexFiles::for_db(&db_path, &IndexParams::new(12, 16).unwrap());
    assert_ne!(narrow.lmer_index, wide.lmer_index);
    assert!(narrow.lmer_index.exists());
    assert!(wide.lmer_index.exists());
    // The k-mer index name varies with the suffix width.
    assert!(narrow.kmer_index.exists());
    assert!(wide.kmer_index.exists());
}

#[test]
fn corrupt_canonical_database_is_fatal() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("snps.db");

    // Not a multiple of the record size.
    fs::write(&db_path, [0u8; 17]).unwrap();
    assert!(matches!(
        Database::open(&db_path, params(), false),
        Err(Error::CorruptDatabase(_))
    ));

    // Records out of k-mer order.
    let sorted = canonical_bytes(&[(1, 0, KMER_A), (2, 0, KMER_B)]);
    let mut unsorted = Vec::new();
    unsorted.extend_from_slice(&sorted[16..32]);
    unsorted.extend_from_slice(&sorted[0..16]);
    fs::write(&db_path, &unsorted).unwrap();
    assert!(matches!(
        Database::open(&db_path, params(), false),
        Err(Error::UnsortedDatabase { .. })
    ));
}

#[test]
fn dispatcher_writes_one_tsv_per_channel() {
    let dir = TempDir::new().unwrap();
    let db_path = write_db(&dir, &[(0x1234, 0, KMER_A), (0x9999, 4, KMER_B)]);
    let db = Database::open(&db_path, params(), false).unwrap();

    let inputs = vec![
        write_fastq(&dir, "a.fastq", &[KMER_A, KMER_A]),
        write_fastq(&dir, "b.fastq", &["TTTTTTTTTTTTTTTTTTTTTTTTTTTTTTT"]),
        write_fastq(&dir, "c.fastq", &[KMER_B, KMER_A]),
    ];
    let prefix = dir.path().join("out").to_string_lossy().into_owned();
    dispatcher::run(&db, &inputs, &prefix, 2).unwrap();

    assert_eq!(fs::read(format!("{prefix}.0.tsv")).unwrap(), b"4660\t2\n");
    // Zero hits still writes the (empty) file.
    assert_eq!(fs::read(format!("{prefix}.1.tsv")).unwrap(), b"");
    assert_eq!(
        fs::read(format!("{prefix}.2.tsv")).unwrap(),
        b"4660\t1\n39321\t1\n"
    );
}

#[test]
fn results_are_deterministic_across_thread_counts() {
    let dir = TempDir::new().unwrap();
    let db_path = write_db(&dir, &[(0x1234, 0, KMER_A), (0x9999, 4, KMER_B)]);
    let db = Database::open(&db_path, params(), false).unwrap();

    let mixed = format!("{KMER_B}N{KMER_A}");
    let inputs = vec![
        write_fastq(&dir, "a.fastq", &[KMER_A, &mixed]),
        write_fastq(&dir, "b.fastq", &[&mixed, KMER_B, KMER_B]),
        write_fastq(&dir, "c.fastq", &[KMER_A]),
        write_fastq(&dir, "d.fastq", &["TTTTTTTTTTTTTTTTTTTTTTTTTTTTTTT"]),
    ];

    let mut outputs: Vec<Vec<Vec<u8>>> = Vec::new();
    for (label, n_threads) in [("t1", 1), ("t4", 4), ("t1_again", 1)] {
        let prefix = dir.path().join(label).to_string_lossy().into_owned();
        dispatcher::run(&db, &inputs, &prefix, n_threads).unwrap();
        outputs.push(
            (0..inputs.len())
                .map(|channel| fs::read(format!("{prefix}.{channel}.tsv")).unwrap())
                .collect(),
        );
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[test]
fn truncated_input_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let db_path = write_db(&dir, &[(0x1234, 0, KMER_A)]);
    let db = Database::open(&db_path, params(), false).unwrap();

    let path = dir.path().join("broken.fastq");
    let mut bytes = fastq(&[KMER_A]);
    bytes.extend_from_slice(b"@read1\nACGT");
    fs::write(&path, bytes).unwrap();

    let prefix = dir.path().join("out").to_string_lossy().into_owned();
    let err = dispatcher::run(&db, &[path], &prefix, 1).unwrap_err();
    assert!(matches!(err, Error::TruncatedFastq { .. }));
}
