//! Slack interaction callback server.
//!
//! Receives signed interaction callbacks from Slack, verifies them against the
//! app's signing secret, and hands them to an injected handler under a
//! deadline short enough to answer within Slack's 3 second budget.
//!
//! ## Architecture
//!
//! ```text
//! POST / → SecretsVerifier (tee) → decode_callback → Dispatcher → CallbackHandler
//!                                                              ↓
//!                                          200 / 400 / 401 / 500 / 503
//! ```

pub mod config;
pub mod interaction;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError, ServerConfig, SigningSecret, TlsFiles};
pub use interaction::{
    handler_fn, Callback, CallbackEvent, CallbackHandler, DispatchContext, HandlerError,
    InteractionType,
};
pub use web::{CallbackServer, RequestCounter, RequestTrace, ServerError, ShutdownHandle};
