//! Session change notifications.

pub mod bus;

pub use bus::EventBus;
