//! 覆盖度、峰检测、显著性与结果组装
pub mod assemble;
pub mod coverage;
pub mod detect;
pub mod stats;

pub use assemble::{assemble, PeakRecord};
pub use coverage::{accumulate, CoverageArray, CoverageBuilder, Fragments, Pileup};
pub use detect::{PeakCandidate, PeakDetector, PeakParams, Signal};
pub use stats::{
    annotate, rpm, AnnotatedPeak, SeededStreams, SignificanceEngine, StreamSource, TestedPeak,
    DEFAULT_PERMUTATIONS, DEFAULT_SEED,
};
