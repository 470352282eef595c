//! Worker status protocol: wire types and the decoder.

pub mod codec;
pub mod message;

pub use codec::{decode, CodecError};
pub use message::{
    ErrorKind, Message, MessageKind, MessageType, ProgressUpdate, WorkerError, WorkerStatus,
};
