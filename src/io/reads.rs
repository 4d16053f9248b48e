use std::io::BufRead;
use std::path::Path;

use super::fasta::FastaReader;
use super::fastq::FastqReader;
use crate::error::{Error, Result};
use crate::store::{ReadCounter, ReadSet};
use crate::util::alphabet::Alphabet;

/// 测序文件格式，由第一个非空白字节决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFormat {
    /// `>` 开头：每条记录一个 read
    Fasta,
    /// `@` 开头
    Fastq,
    /// 其他：每行 `序列<TAB>次数`，`#` 开头为注释
    Collapsed,
}

/// 跳过开头的空白并返回格式；空输入返回 `None`
pub fn sniff_format<R: BufRead>(reader: &mut R) -> Result<Option<ReadFormat>> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(i) => {
                let fmt = match buf[i] {
                    b'>' => ReadFormat::Fasta,
                    b'@' => ReadFormat::Fastq,
                    _ => ReadFormat::Collapsed,
                };
                reader.consume(i);
                return Ok(Some(fmt));
            }
            None => {
                let n = buf.len();
                reader.consume(n);
            }
        }
    }
}

/// 读取并去重一个测序文件
pub fn read_reads<R: BufRead>(mut reader: R, alphabet: &Alphabet) -> Result<ReadSet> {
    let fmt = match sniff_format(&mut reader)? {
        Some(f) => f,
        None => return Err(Error::EmptyInput("read collection is empty".to_string())),
    };
    debug!("Read collection format: {:?}", fmt);

    let mut counter = ReadCounter::new(alphabet);
    match fmt {
        ReadFormat::Fasta => {
            for rec in FastaReader::new(reader) {
                counter.add(&rec?.seq, 1)?;
            }
        }
        ReadFormat::Fastq => {
            let mut r = FastqReader::new(reader);
            while let Some(rec) = r.next_record()? {
                counter.add(&rec.seq, 1)?;
            }
        }
        ReadFormat::Collapsed => read_collapsed(reader, &mut counter)?,
    }
    counter.finish()
}

fn read_collapsed<R: BufRead>(reader: R, counter: &mut ReadCounter<'_>) -> Result<()> {
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (seq, count) = match (fields.next(), fields.next(), fields.next()) {
            (Some(s), Some(c), None) => (s, c),
            _ => {
                return Err(Error::InvalidFormat(format!(
                    "collapsed reads line {}: expected `sequence<TAB>count`",
                    i + 1
                )))
            }
        };
        let n: u64 = count.parse().map_err(|_| {
            Error::InvalidFormat(format!(
                "collapsed reads line {}: count {:?} is not a non-negative integer",
                i + 1,
                count
            ))
        })?;
        counter.add(seq.as_bytes(), n)?;
    }
    Ok(())
}

pub fn load_reads<P: AsRef<Path>>(path: P, alphabet: &Alphabet) -> Result<ReadSet> {
    let path = path.as_ref();
    let fh = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
    let reads = read_reads(std::io::BufReader::new(fh), alphabet).map_err(|e| match e {
        Error::EmptyInput(msg) => Error::EmptyInput(format!("{}: {}", path.display(), msg)),
        Error::InvalidFormat(msg) => Error::InvalidFormat(format!("{}: {}", path.display(), msg)),
        other => other,
    })?;
    debug!(
        "Loaded {} distinct reads ({} total) from {}",
        reads.len(),
        reads.total_reads(),
        path.display()
    );
    Ok(reads)
}
