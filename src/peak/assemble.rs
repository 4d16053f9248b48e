use std::sync::Arc;

use super::stats::AnnotatedPeak;

/// 输出表中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct PeakRecord {
    pub reference_id: Arc<str>,
    pub rpm: f64,
    pub peak_start: usize,
    pub peak_end: usize,
    pub peak_sequence: String,
    pub p_value: f64,
    pub z_rank: f64,
    pub total_reads_in_file: u64,
    pub source_file_name: String,
}

/// 纯函数：逐个映射，保持输入顺序
pub fn assemble(peaks: &[AnnotatedPeak], source_file_name: &str, total_reads: u64) -> Vec<PeakRecord> {
    peaks
        .iter()
        .map(|p| PeakRecord {
            reference_id: Arc::clone(&p.candidate.reference_id),
            rpm: p.rpm,
            peak_start: p.candidate.start,
            peak_end: p.candidate.end,
            peak_sequence: p.candidate.sequence_window.clone(),
            p_value: p.p_value,
            z_rank: p.z_score,
            total_reads_in_file: total_reads,
            source_file_name: source_file_name.to_string(),
        })
        .collect()
}
