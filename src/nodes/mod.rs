pub mod filter;
pub mod threshold;

pub use filter::FilterEngine;
pub use threshold::ThresholdEngine;
