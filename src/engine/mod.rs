//! Activity classification engine.
//!
//! Pure, synchronous functions over a snapshot of a server's roster and
//! timeline: per-database metric extraction, server trend aggregation,
//! threshold classification, view projection and CSV export.

mod classify;
mod criteria;
mod export;
mod metrics;
mod trend;
mod view;

pub use classify::*;
pub use criteria::*;
pub use export::*;
pub use metrics::*;
pub use trend::*;
pub use view::*;
