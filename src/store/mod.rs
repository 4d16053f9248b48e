//! 参考序列与 read 集合的加载和校验。

pub mod reads;

pub use reads::{ReadCounter, ReadSet};

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::io::fasta::FastaReader;
use crate::util::alphabet::Alphabet;

/// 一条参考序列。载入后不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    id: Arc<str>,
    bases: Vec<u8>,
}

impl Sequence {
    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    /// 大写后的原始碱基（U/T 保持原样）
    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// 闭区间 [start, end] 上的子序列
    pub fn window(&self, start: usize, end: usize) -> String {
        String::from_utf8_lossy(&self.bases[start..=end]).into_owned()
    }
}

/// 参考序列集合
#[derive(Debug, Clone)]
pub struct SequenceStore {
    alphabet: Alphabet,
    references: Vec<Sequence>,
}

impl SequenceStore {
    /// 从 (id, 序列) 对构建
    pub fn from_pairs<I, S, B>(alphabet: &Alphabet, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, B)>,
        S: AsRef<str>,
        B: AsRef<[u8]>,
    {
        let mut seen: HashSet<Arc<str>> = HashSet::new();
        let mut references = Vec::new();
        for (id, seq) in pairs {
            let id = id.as_ref();
            let seq = seq.as_ref();
            if id.is_empty() {
                return Err(Error::InvalidFormat(format!(
                    "reference #{} has no identifier",
                    references.len() + 1
                )));
            }
            if seq.is_empty() {
                return Err(Error::InvalidFormat(format!("reference '{}' is empty", id)));
            }
            let bases = alphabet.normalize(seq).map_err(|(i, b)| {
                Error::InvalidFormat(format!(
                    "reference '{}': symbol {:?} at position {} is not in the alphabet",
                    id, b as char, i
                ))
            })?;
            let id: Arc<str> = Arc::from(id);
            if !seen.insert(Arc::clone(&id)) {
                return Err(Error::InvalidFormat(format!("duplicate reference id '{}'", id)));
            }
            trace!("Loaded reference {} ({} nt)", id, bases.len());
            references.push(Sequence { id, bases });
        }
        if references.is_empty() {
            return Err(Error::EmptyInput("no reference sequences supplied".to_string()));
        }
        Ok(Self {
            alphabet: alphabet.clone(),
            references,
        })
    }

    pub fn from_fasta<R: BufRead>(alphabet: &Alphabet, reader: R) -> Result<Self> {
        let mut pairs = Vec::new();
        for rec in FastaReader::new(reader) {
            let rec = rec?;
            pairs.push((rec.id, rec.seq));
        }
        Self::from_pairs(alphabet, pairs)
    }

    pub fn from_path<P: AsRef<Path>>(alphabet: &Alphabet, path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading reference sequences from {}", path.display());
        let fh = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        let store = Self::from_fasta(alphabet, std::io::BufReader::new(fh)).map_err(|e| match e {
            Error::Io { source, .. } => Error::io(source, path),
            other => other,
        })?;
        debug!("{} reference sequences loaded from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn references(&self) -> &[Sequence] {
        &self.references
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn total_bases(&self) -> usize {
        self.references.iter().map(Sequence::len).sum()
    }
}
