//! Where stored readings go.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::SinkError;

pub trait PersistenceSink<R> {
    fn store(&mut self, sensor: &str, record: &R) -> Result<(), SinkError>;
}

impl<R, S: PersistenceSink<R> + ?Sized> PersistenceSink<R> for Box<S> {
    fn store(&mut self, sensor: &str, record: &R) -> Result<(), SinkError> {
        (**self).store(sensor, record)
    }
}

/// Appends one JSON object per record to `<dir>/<sensor>.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    dir: PathBuf,
}

impl JsonLinesSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, sensor: &str) -> PathBuf {
        self.dir.join(format!("{sensor}.jsonl"))
    }
}

impl<R: Serialize> PersistenceSink<R> for JsonLinesSink {
    fn store(&mut self, sensor: &str, record: &R) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(sensor);

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        OpenOptions::new().create(true).append(true).open(&path)?.write_all(&line)?;

        debug!(path = %path.display(), "appended record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        value: u32,
    }

    #[test]
    fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonLinesSink::new(dir.path().join("data"));

        sink.store("sps30", &Row { value: 1 }).unwrap();
        sink.store("sps30", &Row { value: 2 }).unwrap();

        let contents = fs::read_to_string(sink.path_for("sps30")).unwrap();
        assert_eq!(contents, "{\"value\":1}\n{\"value\":2}\n");
    }

    #[test]
    fn one_file_per_sensor() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonLinesSink::new(dir.path());

        sink.store("indoor", &Row { value: 1 }).unwrap();
        sink.store("outdoor", &Row { value: 2 }).unwrap();

        assert!(dir.path().join("indoor.jsonl").exists());
        assert!(dir.path().join("outdoor.jsonl").exists());
    }
}
