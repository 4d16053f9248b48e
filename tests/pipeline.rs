use std::path::PathBuf;

use frag_finder::config::AnalysisConfig;
use frag_finder::index::{ReadIndex, Weighting};
use frag_finder::io::reads::load_reads;
use frag_finder::io::tsv;
use frag_finder::pipeline::{run_batch, spawn_batch, Control, Event};
use frag_finder::store::SequenceStore;
use frag_finder::Error;

const DB: &str = ">mir-a\nACGUACGUACGU\n>mir-b\nGGGGAAAACCCCUUUU\n>mir-c\nCAGUCAGUCAGUCAGU\n";

fn config() -> AnalysisConfig {
    let mut c = AnalysisConfig {
        permutations: 99,
        threads: 2,
        ..AnalysisConfig::default()
    };
    c.peak.min_height = 2;
    c.peak.min_distance = 1;
    c
}

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let p = dir.path().join(name);
    std::fs::write(&p, body).unwrap();
    p
}

fn references(dir: &tempfile::TempDir, c: &AnalysisConfig) -> SequenceStore {
    SequenceStore::from_path(&c.alphabet, write(dir, "db.fa", DB)).unwrap()
}

#[test]
fn batch_isolates_per_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let c = config();
    let refs = references(&dir, &c);

    let good = write(&dir, "s1.fa", ">1\nACGT\n>2\nACGT\n>3\nacgt\n");
    let malformed = write(&dir, "s2.txt", "ACGU\tmany\n");
    let empty = write(&dir, "s3.txt", "\n\n");
    let collapsed = write(&dir, "s4.txt", "GGGG\t5\nCCCC\t2\n");

    let inputs = vec![good, malformed, empty, collapsed];
    let reports = run_batch(&refs, &inputs, &c, &Control::silent()).unwrap();
    assert_eq!(reports.len(), 4);

    let rows = reports[0].result.as_ref().unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.peak_sequence == "ACGU" && r.source_file_name == "s1.fa"));

    assert!(matches!(reports[1].result, Err(Error::InvalidFormat(_))));
    assert!(matches!(reports[2].result, Err(Error::EmptyInput(_))));

    let rows = reports[3].result.as_ref().unwrap();
    assert!(rows.iter().all(|r| &*r.reference_id == "mir-b" && r.total_reads_in_file == 7));
    assert_eq!(rows.len(), 2);
}

#[test]
fn same_seed_same_output() {
    let dir = tempfile::tempdir().unwrap();
    let c = config();
    let refs = references(&dir, &c);
    let reads = write(&dir, "s.txt", "ACGU\t3\nCAGUCAGU\t4\nGUCA\t1\n");

    let once = |threads: usize| {
        let c = AnalysisConfig { threads, ..c.clone() };
        let reports = run_batch(&refs, &[reads.clone()], &c, &Control::silent()).unwrap();
        let rows = reports.into_iter().next().unwrap().result.unwrap();
        String::from_utf8(tsv::write_records(Vec::new(), &rows).unwrap()).unwrap()
    };
    let a = once(1);
    assert_eq!(a, once(4));
    assert!(a.lines().count() > 1);
}

#[test]
fn persisted_index_gives_identical_rows() {
    let dir = tempfile::tempdir().unwrap();
    let c = config();
    let refs = references(&dir, &c);
    let reads = write(&dir, "s.fa", ">a\nACGU\n>b\nACGU\n>c\nGGGGAAAA\n>d\nGGGGAAAA\n");

    let set = load_reads(&reads, &c.alphabet).unwrap();
    let index = ReadIndex::build(set, &c.alphabet, Weighting::Multiplicity).unwrap();
    let rfx = dir.path().join("s.rfx");
    index.save_to_file(rfx.to_str().unwrap()).unwrap();

    let reports = run_batch(&refs, &[reads, rfx], &c, &Control::silent()).unwrap();
    let from_reads = reports[0].result.as_ref().unwrap();
    let from_index = reports[1].result.as_ref().unwrap();
    assert!(!from_reads.is_empty());
    assert_eq!(from_reads.len(), from_index.len());
    for (a, b) in from_reads.iter().zip(from_index) {
        assert_eq!(
            (a.peak_start, a.peak_end, a.p_value, a.z_rank),
            (b.peak_start, b.peak_end, b.p_value, b.z_rank)
        );
        assert_eq!(b.source_file_name, "s.rfx");
    }
}

#[test]
fn background_task_reports_progress() {
    let dir = tempfile::tempdir().unwrap();
    let c = config();
    let refs = references(&dir, &c);
    let a = write(&dir, "a.txt", "ACGU\t3\n");
    let b = write(&dir, "b.txt", "not a read\n");

    let handle = spawn_batch(refs, vec![a, b], c);
    let events: Vec<Event> = handle.events().iter().collect();
    let reports = handle.join().unwrap();
    assert_eq!(reports.len(), 2);

    let done = events
        .iter()
        .filter(|e| matches!(e, Event::ReferenceDone { file: 0, total: 3, .. }))
        .count();
    assert_eq!(done, 3);
    assert!(events.contains(&Event::FileFinished { file: 0, peaks: 3 }));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::FileFailed { file: 1, .. })));
    assert!(matches!(events.first(), Some(Event::FileStarted { file: 0, .. })));
}

#[test]
fn cancelled_batch_stops() {
    let dir = tempfile::tempdir().unwrap();
    let c = config();
    let refs = references(&dir, &c);
    let a = write(&dir, "a.txt", "ACGU\t3\n");

    let control = Control::silent();
    control.cancel();
    assert!(matches!(
        run_batch(&refs, &[a], &c, &control),
        Err(Error::Cancelled)
    ));
}

#[test]
fn zero_permutations_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let c = AnalysisConfig {
        permutations: 0,
        ..config()
    };
    let refs = references(&dir, &c);
    let a = write(&dir, "a.txt", "ACGU\t3\n");
    assert!(matches!(
        run_batch(&refs, &[a], &c, &Control::silent()),
        Err(Error::Config(_))
    ));
}
