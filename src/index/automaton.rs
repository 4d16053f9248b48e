use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{ReadSet, Sequence};
use crate::util::alphabet::Alphabet;

const NONE: u32 = u32::MAX;
const ROOT: u32 = 0;

/// 覆盖度累加时每个命中的权重
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Weighting {
    /// read 的出现次数
    #[default]
    Multiplicity,
    /// 每条不同的 read 计 1
    Distinct,
}

/// 一次精确命中：参考序列 `reference` 的半开区间 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occurrence {
    pub reference: usize,
    pub pattern: u32,
    pub start: usize,
    pub end: usize,
    pub weight: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Pattern {
    len: u32,
    weight: u64,
}

/// Aho–Corasick 多模式匹配自动机。
///
/// - 构建：先插入所有模式形成 trie，再按 BFS 计算失败链接，并把缺失的
///   转移补全为完整 DFA（`delta`，states × sigma 稠密表）。
/// - 输出：`term[s]` 为以状态 s 结尾的第一个模式；折叠后编码相同的模式
///   通过 `alias` 串起来；`dict[s]` 指向 s 的最近一个终止后缀状态。
/// - 扫描：每个字符一次查表，加上按 `dict` 链枚举命中，
///   总代价 O(参考长度 + 命中数)，与模式数量无关。
///
/// 构建后只读，可在多个线程间共享扫描。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automaton {
    alphabet: Alphabet,
    sigma: usize,
    delta: Vec<u32>,
    term: Vec<u32>,
    dict: Vec<u32>,
    alias: Vec<u32>,
    patterns: Vec<Pattern>,
}

impl Automaton {
    /// 以 ReadSet 的 read 为模式构建，模式编号与 ReadSet 下标一致
    pub fn build(reads: &ReadSet, alphabet: &Alphabet, weighting: Weighting) -> Result<Self> {
        if reads.is_empty() {
            return Err(Error::Construction("no patterns supplied".to_string()));
        }
        let sigma = alphabet.sigma();
        let mut ac = Self {
            alphabet: alphabet.clone(),
            sigma,
            delta: vec![NONE; sigma],
            term: vec![NONE],
            dict: vec![NONE],
            alias: vec![NONE; reads.len()],
            patterns: Vec::with_capacity(reads.len()),
        };

        let mut inserted = 0usize;
        for (id, (seq, count)) in reads.iter().enumerate() {
            let weight = match weighting {
                Weighting::Multiplicity => count,
                Weighting::Distinct => 1,
            };
            ac.patterns.push(Pattern {
                len: seq.len() as u32,
                weight,
            });
            if alphabet.has_barrier(seq) {
                warn!(
                    "Read {} contains an ambiguity barrier symbol and will never match",
                    String::from_utf8_lossy(seq)
                );
                continue;
            }
            ac.insert(id as u32, seq)?;
            inserted += 1;
        }
        if inserted == 0 {
            return Err(Error::Construction(
                "every pattern was excluded by the alphabet".to_string(),
            ));
        }

        ac.link();
        debug!(
            "Automaton built: {} patterns, {} states, sigma {}",
            inserted,
            ac.n_states(),
            sigma
        );
        Ok(ac)
    }

    fn insert(&mut self, id: u32, seq: &[u8]) -> Result<()> {
        let mut s = ROOT as usize;
        for &b in seq {
            let c = self.alphabet.code(b) as usize;
            if c >= self.sigma {
                return Err(Error::Construction(format!(
                    "pattern {} has symbol {:?} outside the alphabet",
                    id, b as char
                )));
            }
            let next = self.delta[s * self.sigma + c];
            s = if next == NONE {
                let ns = self.term.len() as u32;
                self.delta.extend(std::iter::repeat(NONE).take(self.sigma));
                self.term.push(NONE);
                self.dict.push(NONE);
                self.delta[s * self.sigma + c] = ns;
                ns as usize
            } else {
                next as usize
            };
        }
        // 编码相同的模式挂到同一终止状态
        self.alias[id as usize] = self.term[s];
        self.term[s] = id;
        Ok(())
    }

    /// BFS 计算失败链接与字典链接，并补全 DFA 转移
    fn link(&mut self) {
        let sigma = self.sigma;
        let mut fail = vec![ROOT; self.term.len()];
        let mut queue = VecDeque::new();

        for c in 0..sigma {
            let child = self.delta[c];
            if child == NONE {
                self.delta[c] = ROOT;
            } else {
                fail[child as usize] = ROOT;
                queue.push_back(child);
            }
        }

        while let Some(s) = queue.pop_front() {
            let s = s as usize;
            let f = fail[s] as usize;
            for c in 0..sigma {
                let child = self.delta[s * sigma + c];
                let via_fail = self.delta[f * sigma + c];
                if child == NONE {
                    self.delta[s * sigma + c] = via_fail;
                } else {
                    let cf = via_fail as usize;
                    fail[child as usize] = via_fail;
                    self.dict[child as usize] = if self.term[cf] != NONE {
                        via_fail
                    } else {
                        self.dict[cf]
                    };
                    queue.push_back(child);
                }
            }
        }
    }

    /// 扫描一条参考序列，惰性产出所有（含重叠的）命中
    pub fn scan<'a>(&'a self, reference: usize, seq: &'a Sequence) -> Scan<'a> {
        self.scan_bytes(reference, seq.bases())
    }

    pub fn scan_bytes<'a>(&'a self, reference: usize, text: &'a [u8]) -> Scan<'a> {
        Scan {
            ac: self,
            text,
            reference,
            pos: 0,
            state: ROOT,
            out_state: NONE,
            out_pat: NONE,
        }
    }

    pub fn n_states(&self) -> usize {
        self.term.len()
    }

    pub fn n_patterns(&self) -> usize {
        self.patterns.len()
    }

    pub fn pattern_len(&self, id: u32) -> usize {
        self.patterns[id as usize].len as usize
    }

    pub fn pattern_weight(&self, id: u32) -> u64 {
        self.patterns[id as usize].weight
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }
}

/// 一次性扫描迭代器；需要重新扫描时再调用 [`Automaton::scan`]
pub struct Scan<'a> {
    ac: &'a Automaton,
    text: &'a [u8],
    reference: usize,
    pos: usize,
    state: u32,
    out_state: u32,
    out_pat: u32,
}

impl Iterator for Scan<'_> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        let ac = self.ac;
        loop {
            if self.out_pat != NONE {
                let p = self.out_pat;
                self.out_pat = ac.alias[p as usize];
                let pat = ac.patterns[p as usize];
                return Some(Occurrence {
                    reference: self.reference,
                    pattern: p,
                    start: self.pos - pat.len as usize,
                    end: self.pos,
                    weight: pat.weight,
                });
            }
            if self.out_state != NONE {
                let s = self.out_state as usize;
                self.out_pat = ac.term[s];
                self.out_state = ac.dict[s];
                continue;
            }
            if self.pos >= self.text.len() {
                return None;
            }

            let c = ac.alphabet.code(self.text[self.pos]);
            self.pos += 1;
            self.state = if (c as usize) < ac.sigma && !ac.alphabet.is_barrier(c) {
                ac.delta[self.state as usize * ac.sigma + c as usize]
            } else {
                ROOT
            };
            let s = self.state as usize;
            self.out_state = if ac.term[s] != NONE { self.state } else { ac.dict[s] };
        }
    }
}
