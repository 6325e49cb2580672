pub mod record;
pub mod sample;

pub use record::{DispatchBatch, DispatchRecord, ThresholdEvent, ThresholdState};
pub use sample::{ChannelReading, RawSample, CHANNEL_COUNT};
