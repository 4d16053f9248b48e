pub mod automaton;

pub use automaton::{Automaton, Occurrence, Scan, Weighting};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::ReadSet;
use crate::util::alphabet::Alphabet;

/// 索引构建信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexMeta {
    pub reads_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
    pub weighting: Weighting,
}

/// 一个测序文件的 read 集合及其自动机，可落盘复用
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadIndex {
    pub meta: IndexMeta,
    pub reads: ReadSet,
    pub automaton: Automaton,
}

impl ReadIndex {
    pub fn build(reads: ReadSet, alphabet: &Alphabet, weighting: Weighting) -> Result<Self> {
        let automaton = Automaton::build(&reads, alphabet, weighting)?;
        Ok(Self {
            meta: IndexMeta {
                weighting,
                ..IndexMeta::default()
            },
            reads,
            automaton,
        })
    }

    pub fn set_meta(&mut self, meta: IndexMeta) {
        self.meta = meta;
    }

    pub fn total_reads(&self) -> u64 {
        self.reads.total_reads()
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let f = std::fs::File::create(path).map_err(|e| Error::io(e, path))?;
        let mut w = std::io::BufWriter::new(f);
        bincode::serialize_into(&mut w, self).map_err(|e| Error::Index(format!("{}: {}", path, e)))?;
        Ok(())
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let f = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        let idx: Self = bincode::deserialize_from(std::io::BufReader::new(f))
            .map_err(|e| Error::Index(format!("{}: {}", path, e)))?;
        Ok(idx)
    }
}
