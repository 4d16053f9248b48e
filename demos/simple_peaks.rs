//! 演示如何在 library 模式下逐步调用 frag-finder。
//!
//! 运行方式：
//! ```bash
//! cargo run --example simple_peaks
//! ```

use frag_finder::index::{Automaton, Weighting};
use frag_finder::peak::{accumulate, annotate, assemble, PeakDetector, PeakParams, SignificanceEngine};
use frag_finder::store::{ReadSet, SequenceStore};
use frag_finder::util::alphabet::Alphabet;

fn main() -> frag_finder::Result<()> {
    let alphabet = Alphabet::rna();

    // 1. 参考序列（hsa-mir-21 前体的一段）
    let refs = SequenceStore::from_pairs(
        &alphabet,
        [("hsa-mir-21", "UGUCGGGUAGCUUAUCAGACUGAUGUUGACUGUUGAAUCUCAUGGCAACACCAGUCGAUGGGCUGUC")],
    )?;
    let seq = &refs.references()[0];
    println!("参考序列: {} ({} nt)", seq.id(), seq.len());

    // 2. read 集合：DNA 形式，T 与 U 等价
    let reads = ReadSet::from_counts(
        &alphabet,
        [
            ("TAGCTTATCAGACTGATGTTGA", 40),
            ("TAGCTTATCAGACTGATGTTG", 12),
            ("CAACACCAGTCGATGGGCTGT", 9),
            ("GGCAACACCAGTCG", 1),
        ],
    )?;
    println!("read: {} 种, 共 {} 条", reads.len(), reads.total_reads());

    // 3. 自动机 + 扫描 + 覆盖度
    let ac = Automaton::build(&reads, &alphabet, Weighting::Multiplicity)?;
    println!("自动机状态数: {}", ac.n_states());
    let pileup = accumulate(seq.len(), ac.scan(0, seq))?;
    println!("命中数: {}", pileup.fragments.len());

    // 4. 峰检测
    let detector = PeakDetector::new(PeakParams::default());
    let peaks = detector.detect(&pileup.coverage, seq)?;
    for p in &peaks {
        println!("  峰 [{}, {}] 高度={} {}", p.start, p.end, p.height, p.sequence_window);
    }

    // 5. 置换检验、RPM、Z 分数
    let engine = SignificanceEngine::new(1000, 0x5EED, detector.params().signal)?;
    let tested = engine.test_reference(0, seq.len(), peaks, &pileup.fragments)?;
    let annotated = annotate(tested, reads.total_reads())?;

    // 6. 结果行
    println!();
    for row in assemble(&annotated, "demo.fa", reads.total_reads()) {
        println!("{}", row);
    }
    Ok(())
}
