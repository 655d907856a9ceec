//! Interactive CLI chat experience for Chatloom.
//!
//! This module implements the chat loop: streamed replies printed as they
//! flush, markdown rendering of stored transcripts, slash commands for
//! session management, and Ctrl+C to stop a reply. Entry point:
//! `loop_runner::run_chat_loop`.

pub mod banner;
pub mod commands;
pub mod input;
pub mod loop_runner;
pub mod renderer;
