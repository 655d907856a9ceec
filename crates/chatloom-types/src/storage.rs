//! Storage key names for Chatloom's key-value persistence.
//!
//! Every durable value lives under one of these keys in the `KvStore`.

/// JSON array of `SessionRecord`.
pub const SESSIONS_KEY: &str = "chat-sessions";

/// The backend API key entered by the user.
pub const CREDENTIAL_KEY: &str = "gemini-api-key";

/// Appearance preference (`light` or `dark`).
pub const THEME_KEY: &str = "app-theme";
