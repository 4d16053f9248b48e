use crate::error::{Error, Result};
use crate::index::Weighting;
use crate::peak::{PeakParams, DEFAULT_PERMUTATIONS, DEFAULT_SEED};
use crate::util::alphabet::Alphabet;

/// 一次分析的全部参数。
///
/// 每次调用显式传入，不存在进程级的可变全局状态，
/// 因此不同文件、不同批次可以并行且互不影响。
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub alphabet: Alphabet,
    pub weighting: Weighting,
    pub peak: PeakParams,
    /// 低于该 RPM 的峰不输出
    pub min_rpm: Option<f64>,
    pub permutations: usize,
    pub seed: u64,
    /// 0 = 全部可用核心
    pub threads: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alphabet: Alphabet::rna(),
            weighting: Weighting::Multiplicity,
            peak: PeakParams::default(),
            min_rpm: None,
            permutations: DEFAULT_PERMUTATIONS,
            seed: DEFAULT_SEED,
            threads: 0,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.permutations == 0 {
            return Err(Error::Config("permutation count must be at least 1".into()));
        }
        if self.peak.min_distance == 0 {
            return Err(Error::Config("min_distance must be at least 1".into()));
        }
        if self.peak.neighborhood == 0 {
            return Err(Error::Config("neighborhood must be at least 1".into()));
        }
        let f = self.peak.expand_fraction;
        if !(f > 0.0 && f <= 1.0) {
            return Err(Error::Config(format!(
                "expand_fraction must lie in (0, 1], got {}",
                f
            )));
        }
        if let Some(k) = self.peak.min_prominence_sd {
            if !(k >= 0.0 && k.is_finite()) {
                return Err(Error::Config(format!(
                    "min_prominence_sd must be a finite value >= 0, got {}",
                    k
                )));
            }
        }
        if let Some(r) = self.min_rpm {
            if r.is_nan() || r < 0.0 {
                return Err(Error::Config(format!("min_rpm must be >= 0, got {}", r)));
            }
        }
        if self.alphabet.sigma() == 0 {
            return Err(Error::Config("alphabet has no symbols".into()));
        }
        Ok(())
    }

    /// 工作线程数，0 解析为可用核心数
    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}
