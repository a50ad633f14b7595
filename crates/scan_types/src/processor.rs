//! Pluggable data processors.
//!
//! Processors form an ordered chain inside the data router: each one receives
//! the output of all its predecessors, first over the descriptor list at scan
//! start, then over every frame batch. A processor may implement either
//! capability; the defaults are the identity.

use crate::data::{DataFrame, StreamDescriptor};

pub trait DataProcessor: Send + Sync {
    /// Transform the descriptor list announced at scan start.
    fn process_descriptors(
        &self,
        scan_id: u64,
        descriptors: Vec<StreamDescriptor>,
    ) -> Vec<StreamDescriptor> {
        let _ = scan_id;
        descriptors
    }

    /// Transform one batch of frames.
    fn process_frames(&self, frames: Vec<DataFrame>) -> Vec<DataFrame> {
        frames
    }
}
