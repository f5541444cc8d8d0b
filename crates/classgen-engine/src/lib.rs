//! classgen Generation Engine
//!
//! Streams generations from the remote service over long-lived sessions,
//! assembles the streamed fragments, and resolves the final text into
//! content documents.

pub mod assembler;
pub mod config;
pub mod error;
pub mod generation;
pub mod protocol;
pub mod registry;
pub mod session;

pub use assembler::{FinalSource, FinalText, StreamAssembler};
pub use config::{EngineConfig, PromptField, PurposeConfig, CONFIG_FILE_NAME};
pub use error::{EngineError, Result};
pub use generation::{generate, Generation};
pub use protocol::{encode_prompt, ServerFrame};
pub use registry::SessionRegistry;
pub use session::{
    ConnectionState, Connector, FrameSink, FrameStream, Identity, SessionEvent, SessionHandle,
    SessionOptions, Transport, WsConnector,
};
