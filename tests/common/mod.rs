//! Shared fixtures: a simulation output directory and an energy file writer.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use md_monitor::config::MonitorConfig;
use md_monitor::sink::{MemorySink, MetricsSink};
use tempfile::TempDir;

pub const TERMS: [&str; 3] = ["Potential", "Kinetic En.", "Temperature"];

/// Writes double-precision, version 5 energy files.
#[derive(Debug)]
pub struct EdrWriter {
    buf: Vec<u8>,
    nre: usize,
}

impl EdrWriter {
    pub fn new(terms: &[&str]) -> Self {
        let mut w = Self {
            buf: Vec::new(),
            nre: terms.len(),
        };
        w.int(-55_555).int(5).int(i32::try_from(terms.len()).unwrap());
        for t in terms {
            w.string(t).string("kJ/mol");
        }
        w
    }

    pub fn frame(&mut self, step: i64, values: &[f64]) -> &mut Self {
        assert_eq!(values.len(), self.nre);
        #[allow(clippy::cast_precision_loss)]
        let time = step as f64 * 0.002;
        let nre = i32::try_from(self.nre).unwrap();
        self.double(-2e10)
            .int(-7_777_777)
            .int(5)
            .double(time)
            .int64(step)
            .int(0) // nsum
            .int64(1) // nsteps
            .double(0.002)
            .int(nre)
            .int(0) // ndisre
            .int(0) // nblock
            .int(0)
            .int(0)
            .int(0);
        for v in values {
            self.double(*v);
        }
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn int(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn int64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn double(&mut self, v: f64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Plain XDR string, as used for term names and units.
    fn string(&mut self, s: &str) -> &mut Self {
        self.int(i32::try_from(s.len()).unwrap());
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.resize(self.buf.len() + (4 - s.len() % 4) % 4, 0);
        self
    }
}

/// A scratch directory laid out like a simulation's output.
pub struct SimDir {
    dir: TempDir,
}

impl SimDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn log(&self) -> PathBuf {
        self.path().join("md.log")
    }

    pub fn edr(&self) -> PathBuf {
        self.path().join("md.edr")
    }

    pub fn colvar(&self) -> PathBuf {
        self.path().join("COLVAR")
    }

    pub fn hills(&self) -> PathBuf {
        self.path().join("HILLS")
    }

    /// Monitor config over every file, with a poll interval of `interval`.
    pub fn config(&self, interval: Duration) -> MonitorConfig {
        MonitorConfig::new(self.log(), self.edr())
            .with_colvar(self.colvar())
            .with_hills(self.hills())
            .with_energy_terms(TERMS)
            .with_poll_interval(interval)
            .with_join_timeout(Duration::from_secs(10))
    }

    /// Rewrite the energy file with frames at `steps`, as the engine would
    /// after appending to it.
    pub fn write_energy(&self, steps: &[i64]) {
        let mut w = EdrWriter::new(&TERMS);
        for &step in steps {
            #[allow(clippy::cast_precision_loss)]
            let potential = -1000.0 - step as f64;
            w.frame(step, &[potential, 500.0, 300.0]);
        }
        std::fs::write(self.edr(), w.bytes()).expect("Failed to write energy file");
    }

    pub fn append(&self, path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("Failed to open file");
        f.write_all(text.as_bytes()).expect("Failed to append");
    }

    pub fn append_hills(&self, count: usize) {
        for _ in 0..count {
            self.append(&self.hills(), "1.000 0.5 0.35 1.2 10\n");
        }
    }
}

/// A memory sink with a run already open, plus its trait-object handle.
pub fn memory_sink() -> (Arc<MemorySink>, Arc<dyn MetricsSink>) {
    let sink = Arc::new(MemorySink::with_active_run());
    let dyn_sink: Arc<dyn MetricsSink> = sink.clone();
    (sink, dyn_sink)
}

/// Integer values of `key` across every emission that carries it.
pub fn values_of(sink: &MemorySink, key: &str) -> Vec<i64> {
    sink.emitted_with(key)
        .iter()
        .filter_map(|m| m[key].as_i64())
        .collect()
}
