//! Message framing for serial byte streams.
//!
//! Received bytes are cut into [`Message`]s by one of two policies:
//! - timed: everything that arrived during each flush window
//! - code-delimited: split after every occurrence of a delimiter byte
//!
//! Each message carries an `append` flag telling the consumer whether it
//! continues the previous one. The [`engine`] runs the policy on a tokio task
//! per open port. The [`command`] module turns text commands into the bytes
//! to transmit.

pub mod command;
pub mod engine;
pub mod error;
pub mod framer;
pub mod message;
pub mod policy;

pub use command::{encode_command, EncodeError, EncodedCommand};
pub use engine::{
    spawn, EngineConfig, EngineHandle, EngineState, SharedTransport, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_READ_INTERVAL,
};
pub use error::{FrameError, Result};
pub use framer::Framer;
pub use message::Message;
pub use policy::{DelimiterPolicy, CODE_DELIMITED_CADENCE, DEFAULT_INTERVAL_MS};
