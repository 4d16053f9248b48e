//! 单文件分析、多文件批处理，以及带进度事件和取消标志的后台任务。
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;

use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::index::{IndexMeta, ReadIndex};
use crate::io::reads::load_reads;
use crate::peak::{
    annotate, assemble, rpm, CoverageBuilder, PeakDetector, PeakRecord, SignificanceEngine,
    TestedPeak,
};
use crate::store::{ReadSet, SequenceStore};

/// 持久化 read 索引的扩展名
pub const INDEX_EXTENSION: &str = "rfx";

/// 发给调用方的粗粒度进度事件
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    FileStarted {
        file: usize,
        path: PathBuf,
    },
    IndexReady {
        file: usize,
        distinct_reads: usize,
        total_reads: u64,
        states: usize,
    },
    /// 每完成一条参考序列发送一次
    ReferenceDone {
        file: usize,
        done: usize,
        total: usize,
    },
    FileFinished {
        file: usize,
        peaks: usize,
    },
    FileFailed {
        file: usize,
        message: String,
    },
}

/// 事件出口与协作式取消标志
#[derive(Debug, Clone, Default)]
pub struct Control {
    events: Option<Sender<Event>>,
    cancel: Arc<AtomicBool>,
}

impl Control {
    pub fn new(events: Sender<Event>, cancel: Arc<AtomicBool>) -> Self {
        Self {
            events: Some(events),
            cancel,
        }
    }

    /// 不发送事件、不会被取消
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn emit(&self, ev: Event) {
        if let Some(tx) = &self.events {
            // receiver gone: nobody is listening any more
            let _ = tx.send(ev);
        }
    }
}

/// 批处理中单个文件的结果
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub result: Result<Vec<PeakRecord>>,
}

/// 对一个 read 索引跑完整流程：扫描 -> 覆盖度 -> 峰 -> 显著性 -> 结果行。
///
/// 参考序列之间并行（rayon），每条参考序列是一个不可分割的进度单元，
/// 取消标志只在参考序列之间检查。
pub fn analyze_index(
    references: &SequenceStore,
    index: &ReadIndex,
    source_file_name: &str,
    config: &AnalysisConfig,
    control: &Control,
    file: usize,
) -> Result<Vec<PeakRecord>> {
    let total_reads = index.total_reads();
    if total_reads == 0 {
        return Err(Error::DivisionByZero(format!(
            "{}: total read count is zero",
            source_file_name
        )));
    }
    let engine = SignificanceEngine::new(config.permutations, config.seed, config.peak.signal)?;
    let detector = PeakDetector::new(config.peak.clone());
    let automaton = &index.automaton;

    let n_refs = references.len();
    let done = AtomicUsize::new(0);

    let per_reference = references
        .references()
        .par_iter()
        .enumerate()
        .map(|(r, seq)| -> Result<Vec<TestedPeak>> {
            control.check()?;

            let mut builder = CoverageBuilder::new(seq.len());
            for occ in automaton.scan(r, seq) {
                builder.add(&occ)?;
            }
            let pileup = builder.finish();
            let candidates = detector.detect(&pileup.coverage, seq)?;
            trace!(
                "{}: {} fragments, {} peak candidates",
                seq.id(),
                pileup.fragments.len(),
                candidates.len()
            );
            let tested = engine.test_reference(r, seq.len(), candidates, &pileup.fragments)?;

            let d = done.fetch_add(1, Ordering::SeqCst) + 1;
            control.emit(Event::ReferenceDone {
                file,
                done: d,
                total: n_refs,
            });
            Ok(tested)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut tested: Vec<TestedPeak> = per_reference.into_iter().flatten().collect();
    if let Some(min) = config.min_rpm {
        let before = tested.len();
        let mut kept = Vec::with_capacity(before);
        for p in tested {
            if rpm(p.candidate.height, total_reads)? >= min {
                kept.push(p);
            }
        }
        tested = kept;
        debug!("{} of {} peaks pass min_rpm {}", tested.len(), before, min);
    }

    let annotated = annotate(tested, total_reads)?;
    Ok(assemble(&annotated, source_file_name, total_reads))
}

/// 内存中的 read 集合直接分析
pub fn analyze_reads(
    references: &SequenceStore,
    reads: ReadSet,
    source_file_name: &str,
    config: &AnalysisConfig,
) -> Result<Vec<PeakRecord>> {
    config.validate()?;
    let index = ReadIndex::build(reads, &config.alphabet, config.weighting)?;
    analyze_index(references, &index, source_file_name, config, &Control::silent(), 0)
}

/// 打开一个输入：`.rfx` 直接载入，其余按测序文件读取并建索引
pub fn open_index(path: &Path, config: &AnalysisConfig) -> Result<ReadIndex> {
    let is_index = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case(INDEX_EXTENSION))
        .unwrap_or(false);

    if is_index {
        let index = ReadIndex::load_from_file(&path.to_string_lossy())?;
        if index.automaton.alphabet() != &config.alphabet {
            warn!(
                "{} was built with a different alphabet; using the index's own",
                path.display()
            );
        }
        if index.meta.weighting != config.weighting {
            warn!(
                "{} was built with {:?} weighting, not {:?}",
                path.display(),
                index.meta.weighting,
                config.weighting
            );
        }
        return Ok(index);
    }

    let reads = load_reads(path, &config.alphabet)?;
    let mut index = ReadIndex::build(reads, &config.alphabet, config.weighting)?;
    index.set_meta(IndexMeta {
        reads_file: Some(path.display().to_string()),
        build_args: None,
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
        weighting: config.weighting,
    });
    Ok(index)
}

fn analyze_path(
    references: &SequenceStore,
    path: &Path,
    config: &AnalysisConfig,
    control: &Control,
    file: usize,
) -> Result<Vec<PeakRecord>> {
    let index = open_index(path, config)?;
    control.emit(Event::IndexReady {
        file,
        distinct_reads: index.reads.len(),
        total_reads: index.total_reads(),
        states: index.automaton.n_states(),
    });
    debug!(
        "{}: {} distinct reads, {} total, {} automaton states",
        path.display(),
        index.reads.len(),
        index.total_reads(),
        index.automaton.n_states()
    );
    control.check()?;

    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    analyze_index(references, &index, &name, config, control, file)
}

/// 依次处理多个测序文件。
///
/// 单个文件的错误记录在其 [`FileReport`] 中，批处理继续；
/// `InvariantViolation` 与 `Cancelled` 终止整个批处理。
pub fn run_batch(
    references: &SequenceStore,
    inputs: &[PathBuf],
    config: &AnalysisConfig,
    control: &Control,
) -> Result<Vec<FileReport>> {
    config.validate()?;
    let threads = config.worker_threads();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::Config(format!("cannot start {} worker threads: {}", threads, e)))?;
    info!(
        "Analyzing {} file(s) against {} references on {} threads",
        inputs.len(),
        references.len(),
        threads
    );

    let mut reports = Vec::with_capacity(inputs.len());
    for (file, path) in inputs.iter().enumerate() {
        control.check()?;
        control.emit(Event::FileStarted {
            file,
            path: path.clone(),
        });

        let result = pool.install(|| analyze_path(references, path, config, control, file));
        match result {
            Ok(rows) => {
                info!("{}: {} peaks", path.display(), rows.len());
                control.emit(Event::FileFinished {
                    file,
                    peaks: rows.len(),
                });
                reports.push(FileReport {
                    path: path.clone(),
                    result: Ok(rows),
                });
            }
            Err(e) => {
                control.emit(Event::FileFailed {
                    file,
                    message: e.to_string(),
                });
                if e.is_fatal() {
                    return Err(e);
                }
                error!("{}: {}", path.display(), e);
                reports.push(FileReport {
                    path: path.clone(),
                    result: Err(e),
                });
            }
        }
    }
    Ok(reports)
}

/// 后台批处理任务的句柄
pub struct BatchHandle {
    events: Receiver<Event>,
    control: Control,
    worker: JoinHandle<Result<Vec<FileReport>>>,
}

impl BatchHandle {
    /// 任务结束后通道关闭，迭代随之结束
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn join(self) -> Result<Vec<FileReport>> {
        self.worker
            .join()
            .map_err(|_| Error::InvariantViolation("analysis worker panicked".to_string()))?
    }
}

/// 在独立线程上运行 [`run_batch`]
pub fn spawn_batch(
    references: SequenceStore,
    inputs: Vec<PathBuf>,
    config: AnalysisConfig,
) -> BatchHandle {
    let (tx, rx) = crossbeam_channel::unbounded();
    let control = Control::new(tx, Arc::new(AtomicBool::new(false)));
    let worker_control = control.clone();
    let worker = std::thread::spawn(move || {
        run_batch(&references, &inputs, &config, &worker_control)
    });
    // drop our sender so the channel closes when the worker finishes
    let control = Control {
        events: None,
        cancel: control.cancel,
    };
    BatchHandle {
        events: rx,
        control,
        worker,
    }
}
