use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot open result log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("result log I/O error: {source}")]
    Io {
        #[source]
        source: io::Error,
    },
    #[error("CSV write failed: {source}")]
    Csv {
        #[source]
        source: csv::Error,
    },
}

impl SinkError {
    pub(crate) fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }
}

impl From<io::Error> for SinkError {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

impl From<csv::Error> for SinkError {
    fn from(source: csv::Error) -> Self {
        Self::Csv { source }
    }
}
