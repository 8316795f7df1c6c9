//! Shared building blocks for the cluster processes: the framed TCP
//! transport, the wire message types exchanged over it, the wire error type,
//! and the settings record every process threads through.

pub mod error;
pub mod framing;
pub mod message;
pub mod settings;

pub use error::WireError;
pub use framing::Framed;
