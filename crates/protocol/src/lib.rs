//! Wire payloads and the event transport used to exchange
//! them between vault owners and trustees.
//!
//! Every payload is signed by its author and encrypted to a
//! single recipient before it is handed to an [EventTransport],
//! see [encode_event] and [decode_event].
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod event;
mod memory;
mod payload;
mod transport;

pub use error::Error;
pub use event::{
    decode_event, encode_event, EventFilter, InboundEvent, TransportEvent,
};
pub use memory::MemoryTransport;
pub use payload::*;
pub use transport::{BoxedTransport, EventTransport};

/// Result type for the protocol library.
pub type Result<T> = std::result::Result<T, Error>;
