//! # frag-finder
//!
//! 在参考 RNA 序列（如 miRNA 前体）上定位短 RNA 片段 read，
//! 累计位置覆盖度，找出显著富集的峰并打分。
//!
//! 流程：
//!
//! - **载入**：参考序列集合（FASTA）与去重计数后的 read 集合
//! - **匹配**：用全部 read 构建 Aho–Corasick 自动机，每条参考序列只扫描一遍
//! - **覆盖度**：差分 + 前缀和累计命中权重
//! - **峰检测**：局部最大值、最小距离抑制、边界扩展
//! - **显著性**：RPM 归一化、置换检验 p 值、Z 分数排名
//! - **组装**：九列结果行
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use frag_finder::config::AnalysisConfig;
//! use frag_finder::pipeline::analyze_reads;
//! use frag_finder::store::{ReadSet, SequenceStore};
//!
//! let config = AnalysisConfig::default();
//! let refs = SequenceStore::from_pairs(&config.alphabet, [("mir-1", "ACGUACGUACGU")]).unwrap();
//! let reads = ReadSet::from_counts(&config.alphabet, [("ACGU", 3)]).unwrap();
//!
//! for row in analyze_reads(&refs, reads, "sample.fa", &config).unwrap() {
//!     println!("{}", row);
//! }
//! ```
//!
//! ## 模块说明
//!
//! - [`io`] — FASTA / FASTQ / 计数表读取，TSV 输出
//! - [`store`] — 参考序列与 read 集合
//! - [`index`] — Aho–Corasick 自动机与可落盘的 read 索引
//! - [`peak`] — 覆盖度、峰检测、显著性、结果组装
//! - [`pipeline`] — 单文件与批处理流程，进度事件与取消
//! - [`config`] — 分析参数
//! - [`util`] — 字母表

#[macro_use]
extern crate log;

pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod peak;
pub mod pipeline;
pub mod store;
pub mod util;

pub use error::{Error, Result};
