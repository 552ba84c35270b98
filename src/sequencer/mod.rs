//! Step sequencer: a grid of placed notes and the transport that plays it.

pub mod clock;
pub mod event;
pub mod sequence;
pub mod transport;

pub use clock::Clock;
pub use event::{EventId, SequencerEvent};
pub use sequence::{GridLayout, Sequence};
pub use transport::{column_interval, TickReport, Transport, TransportState};
