use std::collections::BTreeMap;
use std::sync::Arc;

use super::coverage::CoverageArray;
use crate::error::{Error, Result};
use crate::store::Sequence;

/// 峰检测所用的信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    /// 起点堆积：每个片段在其起点计一次
    #[default]
    Starts,
    /// 跨度覆盖度
    Depth,
}

/// 峰检测参数
#[derive(Debug, Clone, PartialEq)]
pub struct PeakParams {
    /// 顶点信号的最小值
    pub min_height: u64,
    /// 两个顶点之间的最小距离；更近的只保留较高者
    pub min_distance: usize,
    /// 局部最大值的判定半径
    pub neighborhood: usize,
    /// 边界扩展保留 >= fraction × 顶点高度 的位置
    pub expand_fraction: f64,
    /// 每侧最多扩展的位置数
    pub max_extension: Option<usize>,
    /// 最小突出度，以信号总体标准差的倍数表示；`None` 不过滤
    pub min_prominence_sd: Option<f64>,
    pub signal: Signal,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            min_height: 1,
            min_distance: 18,
            neighborhood: 1,
            expand_fraction: 0.5,
            max_extension: Some(10),
            min_prominence_sd: Some(0.85),
            signal: Signal::Starts,
        }
    }
}

/// 峰候选；`start`/`end` 为闭区间
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeakCandidate {
    pub reference_id: Arc<str>,
    pub start: usize,
    pub end: usize,
    pub apex: usize,
    pub height: u64,
    pub sequence_window: String,
}

pub struct PeakDetector {
    params: PeakParams,
}

impl PeakDetector {
    pub fn new(params: PeakParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PeakParams {
        &self.params
    }

    /// 检测一条参考序列上的峰，结果按位置排序且互不重叠。
    /// 没有位置达到 `min_height` 时返回空列表。
    pub fn detect(&self, coverage: &CoverageArray, reference: &Sequence) -> Result<Vec<PeakCandidate>> {
        if coverage.len() != reference.len() {
            return Err(Error::InvariantViolation(format!(
                "coverage length {} differs from reference {} length {}",
                coverage.len(),
                reference.id(),
                reference.len()
            )));
        }
        let p = &self.params;
        let track = signal_track(coverage, p.signal);

        let apexes = local_maxima(track, p.neighborhood, p.min_height);
        let mut kept = select_by_distance(track, &apexes, p.min_distance);
        if let Some(k) = p.min_prominence_sd {
            let floor = k * population_sd(track);
            kept.retain(|&a| prominence(track, a) as f64 >= floor);
        }

        // 按 (高度降序, 位置升序) 依次确定边界；先确定的峰只让出新顶点及其外侧
        let mut regions: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
        for apex in kept {
            let (mut start, mut end) = self.expand(coverage, track, apex);

            if let Some((&prev, span)) = regions.range_mut(..apex).next_back() {
                if span.1 >= apex {
                    trace!("Peak at {} clipped to end {} by apex {}", prev, apex - 1, apex);
                    span.1 = apex - 1;
                }
                start = start.max(span.1 + 1);
            }
            if let Some((&next, span)) = regions.range_mut(apex + 1..).next() {
                if span.0 <= apex {
                    trace!("Peak at {} clipped to start {} by apex {}", next, apex + 1, apex);
                    span.0 = apex + 1;
                }
                end = end.min(span.0 - 1);
            }
            regions.insert(apex, (start, end));
        }

        Ok(regions
            .into_iter()
            .map(|(apex, (start, end))| PeakCandidate {
                reference_id: Arc::clone(reference.id()),
                start,
                end,
                apex,
                height: track[apex],
                sequence_window: reference.window(start, end),
            })
            .collect())
    }

    /// 从顶点向两侧扩展：值 >= 阈值、不再回升、不超过 max_extension
    fn expand(&self, coverage: &CoverageArray, track: &[u64], apex: usize) -> (usize, usize) {
        let p = &self.params;
        let threshold = p.expand_fraction * track[apex] as f64;
        let limit = p.max_extension.unwrap_or(usize::MAX);

        let mut l = apex;
        let mut steps = 0;
        while l > 0 && steps < limit {
            let v = track[l - 1];
            if (v as f64) < threshold || v > track[l] {
                break;
            }
            l -= 1;
            steps += 1;
        }

        let mut r = apex;
        steps = 0;
        while r + 1 < track.len() && steps < limit {
            let v = track[r + 1];
            if (v as f64) < threshold || v > track[r] {
                break;
            }
            r += 1;
            steps += 1;
        }

        match p.signal {
            Signal::Depth => (l, r),
            // 区间末端取区间内起始片段的最远终点
            Signal::Starts => {
                let reach = coverage.extent()[l..=r].iter().copied().max().unwrap_or(0) as usize;
                (l, r.max(reach.saturating_sub(1)))
            }
        }
    }
}

/// 以默认参数检测，只指定高度与距离
pub fn detect(
    coverage: &CoverageArray,
    reference: &Sequence,
    min_height: u64,
    min_distance: usize,
) -> Result<Vec<PeakCandidate>> {
    PeakDetector::new(PeakParams {
        min_height,
        min_distance,
        ..PeakParams::default()
    })
    .detect(coverage, reference)
}

pub(crate) fn signal_track(coverage: &CoverageArray, signal: Signal) -> &[u64] {
    match signal {
        Signal::Starts => coverage.starts(),
        Signal::Depth => coverage.depth(),
    }
}

/// 局部最大值。等值平台视为一个整体，顶点取平台中点（偏左）；
/// 平台两侧 `w` 个位置内的值都必须严格更低，数组外视为更低。
fn local_maxima(track: &[u64], w: usize, min_height: u64) -> Vec<usize> {
    let n = track.len();
    let mut out = Vec::new();
    let mut i = 0;
    while i < n {
        let v = track[i];
        let mut j = i;
        while j + 1 < n && track[j + 1] == v {
            j += 1;
        }
        if v > 0 && v >= min_height {
            let left_ok = track[i.saturating_sub(w)..i].iter().all(|&x| x < v);
            let right_ok = track[j + 1..(j + 1 + w).min(n)].iter().all(|&x| x < v);
            if left_ok && right_ok {
                out.push(i + (j - i) / 2);
            }
        }
        i = j + 1;
    }
    out
}

/// 突出度：顶点高度减去两侧基线中较高者。
/// 每侧向外走到第一个更高的位置，基线取途经的最小值；走到数组边界时基线为 0。
fn prominence(track: &[u64], apex: usize) -> u64 {
    let h = track[apex];
    let mut left_min = h;
    let mut k = apex;
    while k > 0 && track[k - 1] <= h {
        k -= 1;
        left_min = left_min.min(track[k]);
    }
    if k == 0 {
        left_min = 0;
    }
    let mut right_min = h;
    k = apex;
    while k + 1 < track.len() && track[k + 1] <= h {
        k += 1;
        right_min = right_min.min(track[k]);
    }
    if k + 1 == track.len() {
        right_min = 0;
    }
    h - left_min.max(right_min)
}

fn population_sd(track: &[u64]) -> f64 {
    if track.is_empty() {
        return 0.0;
    }
    let n = track.len() as f64;
    let mean = track.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = track.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}

/// 距离小于 `min_distance` 的顶点只保留较高者，同高保留位置较小者。
/// 返回按优先级排列的顶点。
fn select_by_distance(track: &[u64], apexes: &[usize], min_distance: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..apexes.len()).collect();
    order.sort_by(|&a, &b| {
        track[apexes[b]]
            .cmp(&track[apexes[a]])
            .then(apexes[a].cmp(&apexes[b]))
    });

    let mut keep = vec![true; apexes.len()];
    let mut selected = Vec::new();
    for &i in &order {
        if !keep[i] {
            continue;
        }
        selected.push(apexes[i]);
        let mut k = i;
        while k > 0 && apexes[i] - apexes[k - 1] < min_distance {
            k -= 1;
            keep[k] = false;
        }
        k = i + 1;
        while k < apexes.len() && apexes[k] - apexes[i] < min_distance {
            keep[k] = false;
            k += 1;
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Occurrence;
    use crate::peak::coverage::accumulate;
    use crate::store::SequenceStore;
    use crate::util::alphabet::Alphabet;

    fn reference(seq: &str) -> Sequence {
        let s = SequenceStore::from_pairs(&Alphabet::rna(), [("ref", seq)]).unwrap();
        s.references()[0].clone()
    }

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
    fn tiled_read_gives_three_peaks() {
        let r = reference("ACGUACGUACGU");
        let p = accumulate(12, [occ(0, 4, 3), occ(4, 8, 3), occ(8, 12, 3)]).unwrap();
        let peaks = detect(&p.coverage, &r, 2, 1).unwrap();
        assert_eq!(peaks.len(), 3);
        for (k, pk) in peaks.iter().enumerate() {
            assert_eq!(pk.start, 4 * k);
            assert_eq!(pk.end, 4 * k + 3);
            assert_eq!(pk.height, 3);
            assert_eq!(pk.sequence_window, "ACGU");
        }
    }

    #[test]
    fn below_min_height_is_empty() {
        let r = reference("ACGUACGUACGU");
        let p = accumulate(12, [occ(0, 4, 1)]).unwrap();
        assert!(detect(&p.coverage, &r, 2, 1).unwrap().is_empty());
    }

    #[test]
    fn close_apexes_keep_the_higher() {
        let r = reference("ACGUACGUACGUACGUACGU");
        let p = accumulate(20, [occ(2, 6, 2), occ(5, 9, 5)]).unwrap();
        let peaks = detect(&p.coverage, &r, 1, 4).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].apex, 5);
        assert_eq!(peaks[0].height, 5);
    }

    #[test]
    fn equal_heights_keep_lower_start() {
        let r = reference("ACGUACGUACGUACGUACGU");
        let p = accumulate(20, [occ(2, 6, 4), occ(5, 9, 4)]).unwrap();
        let peaks = detect(&p.coverage, &r, 1, 4).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].apex, 2);
    }

    #[test]
    fn depth_plateau_is_one_peak() {
        let r = reference("AAAACCCCGGGGUUUU");
        let p = accumulate(16, [occ(4, 10, 2)]).unwrap();
        let det = PeakDetector::new(PeakParams {
            min_distance: 1,
            signal: Signal::Depth,
            ..PeakParams::default()
        });
        let peaks = det.detect(&p.coverage, &r).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!((peaks[0].start, peaks[0].end), (4, 9));
        assert_eq!(peaks[0].sequence_window, "CCCCGG");
    }

    #[test]
    fn depth_expansion_respects_fraction_and_limit() {
        let r = reference("ACGUACGUACGUACGUACGUACGUACGUACGU");
        // 20-wide shoulder at depth 1, 2-wide summit at depth 5
        let p = accumulate(32, [occ(5, 25, 1), occ(14, 16, 4)]).unwrap();
        let det = PeakDetector::new(PeakParams {
            min_distance: 1,
            expand_fraction: 0.5,
            signal: Signal::Depth,
            ..PeakParams::default()
        });
        let peaks = det.detect(&p.coverage, &r).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!((peaks[0].start, peaks[0].end), (14, 15));

        let wide = PeakDetector::new(PeakParams {
            min_distance: 1,
            expand_fraction: 0.1,
            max_extension: Some(3),
            signal: Signal::Depth,
            ..PeakParams::default()
        });
        let peaks = wide.detect(&p.coverage, &r).unwrap();
        assert_eq!((peaks[0].start, peaks[0].end), (11, 17));
    }

    #[test]
    fn regions_never_overlap() {
        let r = reference("ACGUACGUACGUACGUACGUACGUACGU");
        let p = accumulate(
            28,
            [occ(0, 10, 5), occ(3, 12, 2), occ(6, 20, 4), occ(15, 25, 1)],
        )
        .unwrap();
        let det = PeakDetector::new(PeakParams {
            min_distance: 1,
            min_prominence_sd: None,
            ..PeakParams::default()
        });
        let peaks = det.detect(&p.coverage, &r).unwrap();
        assert_eq!(
            peaks.iter().map(|pk| pk.apex).collect::<Vec<_>>(),
            vec![0, 3, 6, 15]
        );
        for w in peaks.windows(2) {
            assert!(w[0].end < w[1].start);
        }
        for pk in &peaks {
            assert!(pk.start <= pk.apex && pk.apex <= pk.end && pk.end < 28);
        }
    }

    #[test]
    fn read_extent_is_clipped_at_next_apex() {
        let r = reference(&"ACGU".repeat(12));
        // 两组 22 nt 片段，起点相距 20，延伸部分重叠
        let p = accumulate(48, [occ(0, 22, 5), occ(20, 42, 3)]).unwrap();
        let peaks = detect(&p.coverage, &r, 1, 18).unwrap();
        assert_eq!(peaks.len(), 2);
        assert_eq!((peaks[0].start, peaks[0].end, peaks[0].height), (0, 19, 5));
        assert_eq!((peaks[1].start, peaks[1].end, peaks[1].height), (20, 41, 3));
        assert_eq!(peaks[1].apex, 20);
    }

    #[test]
    fn lower_apex_left_of_higher_peak_is_clipped() {
        let r = reference(&"ACGU".repeat(12));
        let p = accumulate(48, [occ(0, 22, 3), occ(20, 42, 5)]).unwrap();
        let peaks = detect(&p.coverage, &r, 1, 18).unwrap();
        assert_eq!(peaks.len(), 2);
        assert_eq!((peaks[0].start, peaks[0].end, peaks[0].height), (0, 19, 3));
        assert_eq!((peaks[1].start, peaks[1].end, peaks[1].height), (20, 41, 5));
    }

    #[test]
    fn apexes_beyond_min_distance_all_survive() {
        let r = reference(&"ACGU".repeat(20));
        let p = accumulate(
            80,
            [occ(0, 25, 4), occ(18, 40, 6), occ(37, 60, 2), occ(58, 79, 5)],
        )
        .unwrap();
        let peaks = detect(&p.coverage, &r, 1, 18).unwrap();
        assert_eq!(
            peaks.iter().map(|pk| pk.apex).collect::<Vec<_>>(),
            vec![0, 18, 37, 58]
        );
        for w in peaks.windows(2) {
            assert!(w[0].end < w[1].start);
        }
        for pk in &peaks {
            assert!(pk.start <= pk.apex && pk.apex <= pk.end);
        }
    }

    #[test]
    fn prominence_floor_drops_small_bumps() {
        let r = reference(&"ACGU".repeat(10));
        let p = accumulate(40, [occ(2, 12, 10), occ(30, 34, 1)]).unwrap();
        let peaks = PeakDetector::new(PeakParams::default())
            .detect(&p.coverage, &r)
            .unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].apex, 2);

        let off = PeakDetector::new(PeakParams {
            min_prominence_sd: None,
            ..PeakParams::default()
        });
        let peaks = off.detect(&p.coverage, &r).unwrap();
        assert_eq!(peaks.iter().map(|pk| pk.apex).collect::<Vec<_>>(), vec![2, 30]);
    }

    #[test]
    fn prominence_measures_against_higher_base() {
        // 左侧谷底 1，右侧走到边界
        let track = [9, 1, 2, 4, 3, 0];
        assert_eq!(prominence(&track, 3), 3);
        assert_eq!(prominence(&track, 0), 9);
        assert_eq!(prominence(&[2, 6, 3, 5, 1], 3), 2);
    }

    #[test]
    fn detection_is_deterministic() {
        let r = reference("ACGUACGUACGUACGUACGUACGUACGU");
        let p = accumulate(28, [occ(1, 5, 2), occ(9, 14, 3), occ(9, 12, 1), occ(20, 27, 2)]).unwrap();
        let a = detect(&p.coverage, &r, 1, 3).unwrap();
        let b = detect(&p.coverage, &r, 1, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn length_mismatch_is_invariant_violation() {
        let r = reference("ACGU");
        let p = accumulate(5, [occ(0, 2, 1)]).unwrap();
        assert!(matches!(
            detect(&p.coverage, &r, 1, 1),
            Err(Error::InvariantViolation(_))
        ));
    }
}
