use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::peak::PeakRecord;

/// 九列输出表头，列序即下游合并工具的兼容约定
pub const HEADER: [&str; 9] = [
    "reference_id",
    "rpm",
    "peak_start",
    "peak_end",
    "peak_sequence",
    "p_value",
    "z_rank",
    "total_reads_in_file",
    "source_file_name",
];

impl fmt::Display for PeakRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{:.4}\t{}\t{}\t{}\t{:.6}\t{:.4}\t{}\t{}",
            self.reference_id,
            self.rpm,
            self.peak_start,
            self.peak_end,
            self.peak_sequence,
            self.p_value,
            self.z_rank,
            self.total_reads_in_file,
            self.source_file_name
        )
    }
}

pub struct TsvWriter<W: Write> {
    out: W,
}

impl<W: Write> TsvWriter<W> {
    /// 创建时立即写出表头
    pub fn new(mut out: W) -> Result<Self> {
        writeln!(out, "{}", HEADER.join("\t"))?;
        Ok(Self { out })
    }

    pub fn write_record(&mut self, rec: &PeakRecord) -> Result<()> {
        writeln!(self.out, "{}", rec)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

pub fn write_records<W: Write>(out: W, records: &[PeakRecord]) -> Result<W> {
    let mut w = TsvWriter::new(out)?;
    for rec in records {
        w.write_record(rec)?;
    }
    w.finish()
}

/// 输出文件名：`<reads 文件名主干>(<参考库文件名主干>).tsv`
pub fn output_file_name(reads_path: &Path, db_path: &Path) -> String {
    let stem = |p: &Path| {
        p.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    format!("{}({}).tsv", stem(reads_path), stem(db_path))
}
