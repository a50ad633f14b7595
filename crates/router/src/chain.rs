//! Ordered, runtime-mutable chain of data processors.

use std::sync::{Arc, Mutex};

use scan_types::DataProcessor;

/// The processing chain applied to descriptors and frames before fan-out.
///
/// Order is insertion order. Ingestion takes an atomic snapshot of the chain
/// at the start of each call, so a concurrent append/remove is observed
/// either fully or not at all, never partially.
pub struct ProcessorChain {
    inner: Mutex<Vec<Arc<dyn DataProcessor>>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }

    pub fn append(&self, processor: Arc<dyn DataProcessor>) {
        self.inner.lock().unwrap().push(processor);
    }

    /// Remove a processor by handle identity. Returns whether it was present.
    pub fn remove(&self, processor: &Arc<dyn DataProcessor>) -> bool {
        let mut chain = self.inner.lock().unwrap();
        let before = chain.len();
        chain.retain(|p| !Arc::ptr_eq(p, processor));
        chain.len() != before
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomic snapshot of the current chain, in order.
    pub fn snapshot(&self) -> Vec<Arc<dyn DataProcessor>> {
        self.inner.lock().unwrap().clone()
    }
}

impl Default for ProcessorChain {
    fn default() -> Self {
        Self::new()
    }
}
