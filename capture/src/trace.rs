use crate::error::{ParseError, SaveError};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::debug;
use ndarray::{Array2, ErrorKind, ShapeError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// One encryption observed by the scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(rename = "k", with = "base64_bytes")]
    pub key: Vec<u8>,

    #[serde(rename = "pt", with = "base64_bytes")]
    pub plaintext: Vec<u8>,

    #[serde(rename = "ct", with = "base64_bytes")]
    pub ciphertext: Vec<u8>,

    #[serde(rename = "pm")]
    pub power_measurements: Vec<f64>,
}

/// An ordered set of traces, stored on disk as gzipped JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capture {
    traces: Vec<Trace>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trace: Trace) {
        self.traces.push(trace);
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trace> {
        self.traces.iter()
    }

    pub fn load_from<R: Read>(read: R) -> Result<Self, ParseError> {
        let decoder = GzDecoder::new(read);
        Ok(serde_json::from_reader(decoder)?)
    }

    pub fn save_to<W: Write>(&self, write: W) -> Result<W, SaveError> {
        let mut encoder = GzEncoder::new(write, Compression::default());
        serde_json::to_writer(&mut encoder, self)?;
        encoder.write_all(b"\n")?;
        Ok(encoder.finish()?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        debug!("Loading capture from {}", path.to_string_lossy());
        Self::load_from(BufReader::new(File::open(path)?))
    }

    /// Writes to a temporary file beside `path`, then moves it into place, so a failed save
    /// never leaves a truncated capture behind.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SaveError> {
        let path = path.as_ref();
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = NamedTempFile::new_in(directory)?;
        let writer = self.save_to(BufWriter::new(temp))?;
        let temp = writer.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;

        debug!("Saved {} traces to {}", self.len(), path.to_string_lossy());
        Ok(())
    }

    /// All measurements as a traces x samples matrix.
    ///
    /// Fails if the traces don't all hold the same number of samples.
    pub fn samples_matrix(&self) -> Result<Array2<f64>, ShapeError> {
        let rows = self.traces.len();
        let cols = self
            .traces
            .first()
            .map_or(0, |trace| trace.power_measurements.len());
        if self.traces.iter().any(|trace| trace.power_measurements.len() != cols) {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape));
        }

        let data: Vec<f64> = self
            .traces
            .iter()
            .flat_map(|trace| trace.power_measurements.iter().copied())
            .collect();
        Array2::from_shape_vec((rows, cols), data)
    }
}

impl From<Vec<Trace>> for Capture {
    fn from(traces: Vec<Trace>) -> Self {
        Self { traces }
    }
}

impl IntoIterator for Capture {
    type Item = Trace;
    type IntoIter = std::vec::IntoIter<Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.into_iter()
    }
}

impl<'a> IntoIterator for &'a Capture {
    type Item = &'a Trace;
    type IntoIter = std::slice::Iter<'a, Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.iter()
    }
}

// Byte fields are kept as standard base64 strings. Older files wrote null for empty fields.
mod base64_bytes {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        BASE64_STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
