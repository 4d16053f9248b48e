use std::path::PathBuf;

/// frag-finder 库的错误类型。
///
/// 除 `InvariantViolation` 与 `Cancelled` 外，其余错误只影响当前输入文件，
/// 批处理会记录错误并继续处理下一个文件。
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input format: {0}")]
    InvalidFormat(String),

    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("cannot build automaton: {0}")]
    Construction(String),

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("division by zero: {0}")]
    DivisionByZero(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("analysis cancelled")]
    Cancelled,

    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("read index error: {0}")]
    Index(String),
}

impl Error {
    /// Convenience for wrapping an `io::Error` with a path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    /// 致命错误会终止整个批处理，而不是只跳过当前文件。
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_) | Self::Cancelled)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            source: err,
            path: PathBuf::from("<stream>"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
