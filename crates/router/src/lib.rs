//! Data router: scan ingestion, the ordered processing chain, and per-client
//! subscription fan-out.

pub mod chain;
pub mod router;

pub use chain::ProcessorChain;
pub use router::DataRouter;
