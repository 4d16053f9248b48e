use crate::error::{Error, Result};
use crate::index::Occurrence;

/// 单条参考序列的位置覆盖度。
///
/// - `depth[i]`：覆盖位置 i 的命中权重之和（区间 [start, end)）
/// - `starts[i]`：起点恰为 i 的命中权重之和
/// - `extent[i]`：起点为 i 的命中中最远的 end（无命中时为 0）
///
/// 只在累加阶段写入，之后只读。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageArray {
    depth: Vec<u64>,
    starts: Vec<u64>,
    extent: Vec<u32>,
}

impl CoverageArray {
    pub fn len(&self) -> usize {
        self.depth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth.is_empty()
    }

    pub fn depth(&self) -> &[u64] {
        &self.depth
    }

    pub fn starts(&self) -> &[u64] {
        &self.starts
    }

    pub fn extent(&self) -> &[u32] {
        &self.extent
    }
}

/// 命中的 (长度, 权重) 多重集，置换检验据此重新随机摆放
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragments {
    items: Vec<(u32, u64)>,
}

impl Fragments {
    pub fn as_slice(&self) -> &[(u32, u64)] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.items.iter().map(|(_, w)| *w).sum()
    }
}

/// 累加结果：覆盖度 + 命中多重集
#[derive(Debug, Clone)]
pub struct Pileup {
    pub coverage: CoverageArray,
    pub fragments: Fragments,
}

/// 差分累加：起点 +w、终点 -w，最后一次前缀和。
/// 工作量 O(命中数 + 参考长度)，与命中跨度无关。
pub struct CoverageBuilder {
    len: usize,
    delta: Vec<i64>,
    starts: Vec<u64>,
    extent: Vec<u32>,
    fragments: Vec<(u32, u64)>,
}

impl CoverageBuilder {
    pub fn new(reference_length: usize) -> Self {
        Self {
            len: reference_length,
            delta: vec![0; reference_length + 1],
            starts: vec![0; reference_length],
            extent: vec![0; reference_length],
            fragments: Vec::new(),
        }
    }

    /// 越界的命中说明上游有缺陷，返回 `InvariantViolation`
    pub fn add(&mut self, occ: &Occurrence) -> Result<()> {
        if occ.start >= occ.end || occ.end > self.len {
            return Err(Error::InvariantViolation(format!(
                "occurrence [{}, {}) of pattern {} outside reference {} of length {}",
                occ.start, occ.end, occ.pattern, occ.reference, self.len
            )));
        }
        let w = occ.weight as i64;
        self.delta[occ.start] += w;
        self.delta[occ.end] -= w;
        self.starts[occ.start] += occ.weight;
        let e = &mut self.extent[occ.start];
        *e = (*e).max(occ.end as u32);
        self.fragments.push(((occ.end - occ.start) as u32, occ.weight));
        Ok(())
    }

    pub fn finish(self) -> Pileup {
        let mut depth = Vec::with_capacity(self.len);
        let mut run = 0i64;
        for d in &self.delta[..self.len] {
            run += d;
            depth.push(run as u64);
        }
        // 多重集按值排序，使结果与命中到达顺序无关
        let mut items = self.fragments;
        items.sort_unstable();
        Pileup {
            coverage: CoverageArray {
                depth,
                starts: self.starts,
                extent: self.extent,
            },
            fragments: Fragments { items },
        }
    }
}

pub fn accumulate<I>(reference_length: usize, occurrences: I) -> Result<Pileup>
where
    I: IntoIterator<Item = Occurrence>,
{
    let mut b = CoverageBuilder::new(reference_length);
    for occ in occurrences {
        b.add(&occ)?;
    }
    Ok(b.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occ(start: usize, end: usize, weight: u64) -> Occurrence {
        Occurrence {
            reference: 0,
            pattern: 0,
            start,
            end,
            weight,
        }
    }

    #[test]
    fn tiled_read_reaches_its_weight() {
        let p = accumulate(12, [occ(0, 4, 3), occ(4, 8, 3), occ(8, 12, 3)]).unwrap();
        assert_eq!(p.coverage.depth(), &[3u64; 12][..]);
        assert_eq!(p.coverage.starts()[0], 3);
        assert_eq!(p.coverage.starts()[1], 0);
        assert_eq!(p.coverage.extent()[4], 8);
        assert_eq!(p.fragments.total_weight(), 9);
    }

    #[test]
    fn overlapping_spans_add_up() {
        let p = accumulate(6, [occ(0, 3, 1), occ(2, 5, 2)]).unwrap();
        assert_eq!(p.coverage.depth(), &[1, 1, 3, 2, 2, 0]);
    }

    #[test]
    fn order_does_not_matter() {
        let occs = vec![occ(0, 3, 1), occ(2, 5, 2), occ(1, 6, 4), occ(2, 4, 7)];
        let a = accumulate(6, occs.clone()).unwrap();
        let mut rev = occs;
        rev.reverse();
        let b = accumulate(6, rev).unwrap();
        assert_eq!(a.coverage, b.coverage);
        assert_eq!(a.fragments, b.fragments);
    }

    #[test]
    fn out_of_bounds_is_invariant_violation() {
        assert!(matches!(
            accumulate(4, [occ(2, 5, 1)]),
            Err(Error::InvariantViolation(_))
        ));
        assert!(matches!(
            accumulate(4, [occ(2, 2, 1)]),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn no_occurrences_gives_zero_array() {
        let p = accumulate(5, std::iter::empty()).unwrap();
        assert_eq!(p.coverage.depth(), &[0; 5]);
        assert!(p.fragments.is_empty());
    }
}
