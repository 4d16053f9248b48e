use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::alphabet::Alphabet;

/// 去重后的 read 集合：序列 -> 出现次数。
///
/// 序列按字典序排列，下标即自动机中的模式编号，因此同一输入总是得到相同编号。
/// `total_reads` 为所有次数之和，用于 RPM 归一化。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSet {
    reads: Vec<Vec<u8>>,
    counts: Vec<u64>,
    total: u64,
}

impl ReadSet {
    /// 从 (序列, 次数) 对构建；相同序列的次数会合并
    pub fn from_counts<I, B>(alphabet: &Alphabet, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (B, u64)>,
        B: AsRef<[u8]>,
    {
        let mut counter = ReadCounter::new(alphabet);
        for (seq, n) in pairs {
            counter.add(seq.as_ref(), n)?;
        }
        counter.finish()
    }

    /// 从原始 read 构建，内部计数
    pub fn from_reads<I, B>(alphabet: &Alphabet, reads: I) -> Result<Self>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self::from_counts(alphabet, reads.into_iter().map(|r| (r, 1)))
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    /// 所有 read 的次数之和
    pub fn total_reads(&self) -> u64 {
        self.total
    }

    pub fn sequence(&self, id: usize) -> &[u8] {
        &self.reads[id]
    }

    pub fn count(&self, id: usize) -> u64 {
        self.counts[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], u64)> + '_ {
        self.reads
            .iter()
            .map(Vec::as_slice)
            .zip(self.counts.iter().copied())
    }
}

/// 流式累计 read，供文件读取器逐条喂入
pub struct ReadCounter<'a> {
    alphabet: &'a Alphabet,
    counts: HashMap<Vec<u8>, u64>,
    added: usize,
}

impl<'a> ReadCounter<'a> {
    pub fn new(alphabet: &'a Alphabet) -> Self {
        Self {
            alphabet,
            counts: HashMap::new(),
            added: 0,
        }
    }

    pub fn add(&mut self, seq: &[u8], n: u64) -> Result<()> {
        self.added += 1;
        if seq.is_empty() {
            return Err(Error::InvalidFormat(format!("read #{} is empty", self.added)));
        }
        if n == 0 {
            return Err(Error::InvalidFormat(format!(
                "read #{} ({}) has count 0",
                self.added,
                String::from_utf8_lossy(seq)
            )));
        }
        let norm = self.alphabet.normalize(seq).map_err(|(i, b)| {
            Error::InvalidFormat(format!(
                "read #{}: symbol {:?} at position {} is not in the alphabet",
                self.added, b as char, i
            ))
        })?;
        *self.counts.entry(norm).or_insert(0) += n;
        Ok(())
    }

    pub fn finish(self) -> Result<ReadSet> {
        if self.counts.is_empty() {
            return Err(Error::EmptyInput("no reads supplied".to_string()));
        }
        let mut pairs: Vec<(Vec<u8>, u64)> = self.counts.into_iter().collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let total = pairs.iter().map(|(_, n)| *n).sum();
        let (reads, counts) = pairs.into_iter().unzip();
        Ok(ReadSet {
            reads,
            counts,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_preserves_multiplicity() {
        let a = Alphabet::rna();
        let rs = ReadSet::from_reads(&a, ["ACGU", "acgu", "GGA", "ACGU"]).unwrap();
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.total_reads(), 4);
        assert_eq!(rs.sequence(0), b"ACGU");
        assert_eq!(rs.count(0), 3);
        assert_eq!(rs.count(1), 1);
    }

    #[test]
    fn counts_are_merged() {
        let a = Alphabet::rna();
        let rs = ReadSet::from_counts(&a, [("AC", 2), ("GG", 5), ("AC", 1)]).unwrap();
        let v: Vec<_> = rs.iter().collect();
        assert_eq!(v, vec![(&b"AC"[..], 3), (&b"GG"[..], 5)]);
        assert_eq!(rs.total_reads(), 8);
    }

    #[test]
    fn zero_reads_is_empty_input() {
        let a = Alphabet::rna();
        let none: [&str; 0] = [];
        assert!(matches!(
            ReadSet::from_reads(&a, none),
            Err(Error::EmptyInput(_))
        ));
    }

    #[test]
    fn bad_reads_are_invalid_format() {
        let a = Alphabet::rna();
        assert!(matches!(
            ReadSet::from_reads(&a, ["ACXG"]),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            ReadSet::from_reads(&a, [""]),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            ReadSet::from_counts(&a, [("AC", 0)]),
            Err(Error::InvalidFormat(_))
        ));
    }
}
