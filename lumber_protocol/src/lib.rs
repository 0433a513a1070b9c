//! Transport-agnostic protocol seams for the lumber bulk transport.
//!
//! Wire codecs are written against [`Connection`], a duplex byte
//! stream, and expose two halves: a [`BatchReader`] that decodes
//! exactly one batch per call and an [`AckWriter`] that reports
//! progress back to the producer. The same codec runs unmodified over
//! a raw socket or an HTTP request/response pair.
//!
//! The byte-level binary lumberjack framing lives outside this
//! workspace; the built-in [`frames`] codec speaks newline-delimited
//! JSON and is registered in the server's version dispatch table.

pub mod codec;
pub mod connection;
pub mod error;
pub mod frames;

pub use codec::{AckWriter, BatchReader, CodecFactory};
pub use connection::Connection;
pub use error::{ProtocolError, Result};
pub use frames::{
    AckFrame, JsonFrameReader, JsonFrameWriter, PROTOCOL_VERSION, encode_batch, json_frame_codec,
};
