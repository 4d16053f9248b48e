use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rayon::prelude::*;

use super::coverage::Fragments;
use super::detect::{PeakCandidate, Signal};
use crate::error::{Error, Result};

pub const DEFAULT_PERMUTATIONS: usize = 1000;
pub const DEFAULT_SEED: u64 = 0x5EED;

/// 置换检验的随机源：每个 (参考序列, 试验) 对应一条独立的随机流，
/// 因此结果与线程数、调度顺序无关。
pub trait StreamSource: Sync {
    type Rng: RngCore;

    fn stream(&self, reference: usize, trial: usize) -> Self::Rng;
}

/// 默认随机源：StdRng，种子由全局种子、参考序列下标、试验编号经 splitmix64 混合得到
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededStreams {
    pub seed: u64,
}

impl StreamSource for SeededStreams {
    type Rng = StdRng;

    fn stream(&self, reference: usize, trial: usize) -> StdRng {
        let s = splitmix64(self.seed ^ splitmix64(reference as u64));
        StdRng::seed_from_u64(splitmix64(s ^ (trial as u64).rotate_left(32)))
    }
}

#[inline]
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// 带置换 p 值的峰
#[derive(Debug, Clone, PartialEq)]
pub struct TestedPeak {
    pub candidate: PeakCandidate,
    pub p_value: f64,
}

/// 带全部统计量的峰
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedPeak {
    pub candidate: PeakCandidate,
    pub rpm: f64,
    pub p_value: f64,
    pub z_score: f64,
}

/// Reads Per Million。先乘后除，total = 1e6 时结果与 height 完全相等。
pub fn rpm(height: u64, total_reads: u64) -> Result<f64> {
    if total_reads == 0 {
        return Err(Error::DivisionByZero(
            "total read count is zero; RPM is undefined".to_string(),
        ));
    }
    Ok(height as f64 * 1_000_000.0 / total_reads as f64)
}

/// 按总体均值与标准差计算 Z 分数；标准差为 0 时全部为 0
pub fn z_scores(heights: &[u64]) -> Vec<f64> {
    if heights.is_empty() {
        return Vec::new();
    }
    let n = heights.len() as f64;
    let mean = heights.iter().map(|&h| h as f64).sum::<f64>() / n;
    let var = heights
        .iter()
        .map(|&h| {
            let d = h as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let sd = var.sqrt();
    heights
        .iter()
        .map(|&h| if sd > 0.0 { (h as f64 - mean) / sd } else { 0.0 })
        .collect()
}

/// 计算 RPM 与 Z 分数，并按 (Z 降序, p 升序, 参考 id, 起点) 排序
pub fn annotate(peaks: Vec<TestedPeak>, total_reads: u64) -> Result<Vec<AnnotatedPeak>> {
    if total_reads == 0 {
        return Err(Error::DivisionByZero(
            "total read count is zero; RPM is undefined".to_string(),
        ));
    }
    let heights: Vec<u64> = peaks.iter().map(|p| p.candidate.height).collect();
    let z = z_scores(&heights);

    let mut out = peaks
        .into_iter()
        .zip(z)
        .map(|(p, z_score)| {
            Ok(AnnotatedPeak {
                rpm: rpm(p.candidate.height, total_reads)?,
                p_value: p.p_value,
                z_score,
                candidate: p.candidate,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    out.sort_by(rank_order);
    Ok(out)
}

fn rank_order(a: &AnnotatedPeak, b: &AnnotatedPeak) -> Ordering {
    b.z_score
        .total_cmp(&a.z_score)
        .then(a.p_value.total_cmp(&b.p_value))
        .then_with(|| a.candidate.reference_id.cmp(&b.candidate.reference_id))
        .then(a.candidate.start.cmp(&b.candidate.start))
}

/// 置换检验与排名
pub struct SignificanceEngine<S = SeededStreams> {
    permutations: usize,
    signal: Signal,
    streams: S,
}

impl SignificanceEngine<SeededStreams> {
    pub fn new(permutations: usize, seed: u64, signal: Signal) -> Result<Self> {
        Self::with_streams(permutations, signal, SeededStreams { seed })
    }
}

impl<S: StreamSource> SignificanceEngine<S> {
    pub fn with_streams(permutations: usize, signal: Signal, streams: S) -> Result<Self> {
        if permutations == 0 {
            return Err(Error::Config(
                "permutation count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            permutations,
            signal,
            streams,
        })
    }

    pub fn permutations(&self) -> usize {
        self.permutations
    }

    /// 对一条参考序列上的全部峰做置换检验。
    ///
    /// 每次试验把该参考序列上的全部命中（长度、权重不变）均匀随机地重新摆放，
    /// 重建检测信号，再看每个峰区间内的最大值是否 >= 观测高度。
    /// p = (命中次数 + 1) / (N + 1)。
    pub fn permutation_pvalues(
        &self,
        reference: usize,
        reference_len: usize,
        candidates: &[PeakCandidate],
        fragments: &Fragments,
    ) -> Result<Vec<f64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(&(l, _)) = fragments.as_slice().iter().find(|(l, _)| *l as usize > reference_len || *l == 0) {
            return Err(Error::InvariantViolation(format!(
                "fragment of length {} cannot be placed on reference {} of length {}",
                l, reference, reference_len
            )));
        }
        if let Some(c) = candidates.iter().find(|c| c.start > c.end || c.end >= reference_len) {
            return Err(Error::InvariantViolation(format!(
                "peak [{}, {}] outside reference {} of length {}",
                c.start, c.end, reference, reference_len
            )));
        }

        let k = candidates.len();
        let signal = self.signal;
        let frags = fragments.as_slice();

        let hits = (0..self.permutations)
            .into_par_iter()
            .fold(
                || (vec![0u64; k], vec![0i64; reference_len + 1]),
                |(mut hits, mut buf), trial| {
                    let mut rng = self.streams.stream(reference, trial);
                    buf.iter_mut().for_each(|v| *v = 0);
                    for &(l, w) in frags {
                        let l = l as usize;
                        let s = rng.gen_range(0..=reference_len - l);
                        buf[s] += w as i64;
                        if signal == Signal::Depth {
                            buf[s + l] -= w as i64;
                        }
                    }
                    if signal == Signal::Depth {
                        let mut run = 0i64;
                        for v in buf.iter_mut().take(reference_len) {
                            run += *v;
                            *v = run;
                        }
                    }
                    for (h, c) in hits.iter_mut().zip(candidates) {
                        let m = buf[c.start..=c.end].iter().copied().max().unwrap_or(0);
                        if m >= c.height as i64 {
                            *h += 1;
                        }
                    }
                    (hits, buf)
                },
            )
            .map(|(hits, _)| hits)
            .reduce(
                || vec![0u64; k],
                |mut a, b| {
                    a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                    a
                },
            );

        let denom = (self.permutations + 1) as f64;
        Ok(hits.into_iter().map(|h| (h + 1) as f64 / denom).collect())
    }

    pub fn test_reference(
        &self,
        reference: usize,
        reference_len: usize,
        candidates: Vec<PeakCandidate>,
        fragments: &Fragments,
    ) -> Result<Vec<TestedPeak>> {
        let p = self.permutation_pvalues(reference, reference_len, &candidates, fragments)?;
        Ok(candidates
            .into_iter()
            .zip(p)
            .map(|(candidate, p_value)| TestedPeak { candidate, p_value })
            .collect())
    }

    pub fn annotate(&self, peaks: Vec<TestedPeak>, total_reads: u64) -> Result<Vec<AnnotatedPeak>> {
        annotate(peaks, total_reads)
    }
}
