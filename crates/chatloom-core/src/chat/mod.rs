//! Chat sessions and the generation pipeline.
//!
//! - `SessionStore`: authoritative session table with write-through persistence
//! - `StreamingOrchestrator`: one cancellable generation per session
//! - `RetryCoordinator`: regenerates a failed exchange
//! - `TitleGenerator`: one-shot title derivation
//! - `PersistenceCodec`: live session <-> durable record

pub mod advisory;
pub mod codec;
pub mod conversation;
pub mod orchestrator;
pub mod retry;
pub mod session;
pub mod store;
pub mod throttle;
pub mod title;

pub use advisory::{Advisory, AdvisoryState};
pub use codec::PersistenceCodec;
pub use conversation::Conversation;
pub use orchestrator::{StreamOptions, StreamingOrchestrator};
pub use retry::RetryCoordinator;
pub use session::ChatSession;
pub use store::SessionStore;
pub use title::TitleGenerator;
