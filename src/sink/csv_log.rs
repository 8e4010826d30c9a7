use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, Terminator, WriterBuilder};

use super::{LogRecord, ResultLog, SinkError};

pub const GOOD_LOG: &str = "good.csv";
pub const BAD_LOG: &str = "bad.csv";
pub const LOG_HEADER: &str = "email,method,details,timestamp,proxy";

/// Two append-only CSV files in one directory: `good.csv` for valid
/// verdicts, `bad.csv` for everything else. Fields are always quoted; the
/// header is written once, when a file is created empty.
pub struct CsvResultLog {
    dir: PathBuf,
    good: csv::Writer<File>,
    bad: csv::Writer<File>,
}

impl CsvResultLog {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|err| SinkError::open(dir, err))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            good: open_log(&dir.join(GOOD_LOG))?,
            bad: open_log(&dir.join(BAD_LOG))?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn open_log(path: &Path) -> Result<csv::Writer<File>, SinkError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| SinkError::open(path, err))?;
    let empty = file.metadata().map_err(|err| SinkError::open(path, err))?.len() == 0;
    if empty {
        writeln!(file, "{LOG_HEADER}")?;
    }
    Ok(WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(file))
}

impl ResultLog for CsvResultLog {
    fn append(&mut self, record: &LogRecord<'_>) -> Result<(), SinkError> {
        let writer = if record.valid { &mut self.good } else { &mut self.bad };
        writer.write_record([
            record.email,
            record.method,
            record.details,
            record.timestamp.as_str(),
            record.proxy,
        ])?;
        // flush per record: the files are read while a batch is still running
        writer.flush()?;
        Ok(())
    }
}
