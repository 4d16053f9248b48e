use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 不在字母表中的字节
pub const INVALID: u8 = u8::MAX;

/// 默认识别的符号：{A, C, G, T, U, N}
pub const DEFAULT_SYMBOLS: &[u8] = b"ACGTUN";

/// 参考序列中简并碱基 `N` 的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Ambiguity {
    /// N 作为普通符号，只与 N 匹配
    #[default]
    Literal,
    /// N 打断所有匹配；含 N 的 read 不参与建树
    Barrier,
}

/// 可配置字母表：字节 -> 紧凑编码 [0, sigma)。
///
/// 小写字母与大写字母编码相同。`fold_uracil` 打开时 U 与 T 共用一个编码，
/// 这样 DNA 形式的测序 read 可以直接匹配 RNA 形式的参考序列。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alphabet {
    symbols: Vec<u8>,
    /// 256 项查找表
    table: Vec<u8>,
    sigma: usize,
    ambiguity: Ambiguity,
    barrier: Option<u8>,
}

impl Alphabet {
    pub fn new(symbols: &[u8], fold_uracil: bool, ambiguity: Ambiguity) -> Result<Self> {
        let mut uniq: Vec<u8> = Vec::with_capacity(symbols.len());
        for &b in symbols {
            if !b.is_ascii_alphabetic() {
                return Err(Error::Config(format!(
                    "alphabet symbol {:?} is not a letter",
                    b as char
                )));
            }
            let up = b.to_ascii_uppercase();
            if !uniq.contains(&up) {
                uniq.push(up);
            }
        }
        if uniq.is_empty() {
            return Err(Error::Config("alphabet has no symbols".to_string()));
        }

        let mut table = vec![INVALID; 256];
        let mut sigma = 0u8;
        for &up in &uniq {
            let twin = match up {
                b'U' if fold_uracil => Some(b'T'),
                b'T' if fold_uracil => Some(b'U'),
                _ => None,
            };
            let code = match twin.map(|t| table[t as usize]) {
                Some(c) if c != INVALID => c,
                _ => {
                    let c = sigma;
                    sigma += 1;
                    c
                }
            };
            table[up as usize] = code;
            table[up.to_ascii_lowercase() as usize] = code;
        }

        let barrier = match ambiguity {
            Ambiguity::Barrier => Some(table[b'N' as usize]).filter(|&c| c != INVALID),
            Ambiguity::Literal => None,
        };

        Ok(Self {
            symbols: uniq,
            table,
            sigma: sigma as usize,
            ambiguity,
            barrier,
        })
    }

    /// A/C/G/T/U/N，U≡T，N 按字面匹配
    pub fn rna() -> Self {
        Self::new(DEFAULT_SYMBOLS, true, Ambiguity::Literal)
            .unwrap_or_else(|_| unreachable!("default alphabet is valid"))
    }

    #[inline]
    pub fn code(&self, b: u8) -> u8 {
        self.table[b as usize]
    }

    /// 编码种类数（折叠后）
    #[inline]
    pub fn sigma(&self) -> usize {
        self.sigma
    }

    #[inline]
    pub fn is_barrier(&self, code: u8) -> bool {
        self.barrier == Some(code)
    }

    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }

    pub fn ambiguity(&self) -> Ambiguity {
        self.ambiguity
    }

    /// 转为大写并校验每个符号；返回首个非法符号的位置
    pub fn normalize(&self, seq: &[u8]) -> std::result::Result<Vec<u8>, (usize, u8)> {
        let mut out = Vec::with_capacity(seq.len());
        for (i, &b) in seq.iter().enumerate() {
            if self.table[b as usize] == INVALID {
                return Err((i, b));
            }
            out.push(b.to_ascii_uppercase());
        }
        Ok(out)
    }

    pub fn encode(&self, seq: &[u8]) -> Vec<u8> {
        seq.iter().map(|&b| self.code(b)).collect()
    }

    /// 序列是否含有屏障符号
    pub fn has_barrier(&self, seq: &[u8]) -> bool {
        self.barrier.is_some() && seq.iter().any(|&b| self.is_barrier(self.code(b)))
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::rna()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_folds_uracil() {
        let a = Alphabet::rna();
        assert_eq!(a.sigma(), 5);
        assert_eq!(a.code(b'T'), a.code(b'U'));
        assert_eq!(a.code(b'u'), a.code(b'T'));
        assert_ne!(a.code(b'A'), a.code(b'C'));
        assert_eq!(a.code(b'X'), INVALID);
    }

    #[test]
    fn unfolded_keeps_t_and_u_apart() {
        let a = Alphabet::new(b"acgtun", false, Ambiguity::Literal).unwrap();
        assert_eq!(a.sigma(), 6);
        assert_ne!(a.code(b'T'), a.code(b'U'));
    }

    #[test]
    fn normalize_uppercases_and_rejects() {
        let a = Alphabet::rna();
        assert_eq!(a.normalize(b"acgUn").unwrap(), b"ACGUN");
        assert_eq!(a.normalize(b"ACXG"), Err((2, b'X')));
    }

    #[test]
    fn barrier_only_when_configured() {
        let lit = Alphabet::rna();
        assert!(!lit.has_barrier(b"ACNG"));
        let bar = Alphabet::new(DEFAULT_SYMBOLS, true, Ambiguity::Barrier).unwrap();
        assert!(bar.has_barrier(b"ACNG"));
        assert!(!bar.has_barrier(b"ACGG"));
    }

    #[test]
    fn rejects_empty_and_non_letters() {
        assert!(Alphabet::new(b"", true, Ambiguity::Literal).is_err());
        assert!(Alphabet::new(b"AC-", true, Ambiguity::Literal).is_err());
    }
}
