//! Scan data model: stream descriptors announced at scan start and the typed
//! data frames produced while a scan runs.
//!
//! Stream names starting with [`RESERVED_PREFIX`] are internal bookkeeping
//! streams: a wildcard subscription never matches them, only an exact-name
//! subscription does.

use serde::{Deserialize, Serialize};

/// Prefix marking internal stream names, excluded from wildcard matching.
pub const RESERVED_PREFIX: &str = "__";

/// The wildcard subscription item.
pub const WILDCARD: &str = "*";

/// Element type of a data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    Float64,
    Int64,
    Text,
    Raw,
}

/// Metadata describing one named data stream within a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    pub dtype: DataType,
    /// Shape of one batch element; empty for scalars.
    pub shape: Vec<usize>,
}

impl StreamDescriptor {
    pub fn new(name: impl Into<String>, dtype: DataType, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
        }
    }

    /// A scalar float stream, the common case for sensor readouts.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Float64, Vec::new())
    }

    /// Whether this stream is internal bookkeeping, hidden from wildcards.
    pub fn is_reserved(&self) -> bool {
        self.name.starts_with(RESERVED_PREFIX)
    }
}

/// One batch of values for a single named stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub name: String,
    /// Microseconds since the Unix epoch, assigned by the producer.
    pub timestamp_us: u64,
    pub values: FrameValues,
}

/// Typed payload of a [`DataFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameValues {
    Float64(Vec<f64>),
    Int64(Vec<i64>),
    Text(String),
    Raw(Vec<u8>),
}

impl DataFrame {
    pub fn new(name: impl Into<String>, timestamp_us: u64, values: FrameValues) -> Self {
        Self {
            name: name.into(),
            timestamp_us,
            values,
        }
    }

    /// Number of values carried in this batch.
    pub fn len(&self) -> usize {
        match &self.values {
            FrameValues::Float64(v) => v.len(),
            FrameValues::Int64(v) => v.len(),
            FrameValues::Text(_) => 1,
            FrameValues::Raw(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DataType {
        match &self.values {
            FrameValues::Float64(_) => DataType::Float64,
            FrameValues::Int64(_) => DataType::Int64,
            FrameValues::Text(_) => DataType::Text,
            FrameValues::Raw(_) => DataType::Raw,
        }
    }
}

/// Terminal status of a scan, broadcast to every client at scan end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanStatus {
    Completed,
    Aborted,
    Failed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_reserved_prefix() {
        assert!(StreamDescriptor::scalar("__seq").is_reserved());
        assert!(!StreamDescriptor::scalar("temp").is_reserved());
        // A single leading underscore is an ordinary name.
        assert!(!StreamDescriptor::scalar("_temp").is_reserved());
    }

    #[test]
    fn frame_len_and_dtype() {
        let frame = DataFrame::new("temp", 1_000, FrameValues::Float64(vec![1.0, 2.0, 3.0]));
        assert_eq!(frame.len(), 3);
        assert!(!frame.is_empty());
        assert_eq!(frame.dtype(), DataType::Float64);

        let text = DataFrame::new("note", 1_001, FrameValues::Text("mark".into()));
        assert_eq!(text.len(), 1);
        assert_eq!(text.dtype(), DataType::Text);
    }

    #[test]
    fn scan_status_wire_format() {
        let status = ScanStatus::Failed {
            reason: "shutter stuck".into(),
        };
        let json = serde_json::to_string(&status).unwrap();
        let back: ScanStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
