//! Core primitives shared by every lumber transport.
//!
//! A [`Batch`] is an ordered group of events that travels through the
//! system as a unit and carries a one-shot [`AckGate`]. Server handlers
//! enqueue batches onto a bounded [`channel`]; the application consumer
//! drains the channel, processes each batch and closes its gate, which
//! unblocks the handler waiting to acknowledge the remote producer.

pub mod batch;
pub mod channel;
pub mod error;

pub use batch::{AckGate, Batch, Event};
pub use channel::{BatchReceiver, BatchSender, DEFAULT_CHANNEL_CAPACITY, batch_channel};
pub use error::{ChannelError, Result};
