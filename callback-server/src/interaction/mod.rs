//! Slack interaction events and their dispatch.
//!
//! ## Processing Flow
//!
//! ```text
//! verified body → decode_callback() → Callback → Dispatcher → CallbackHandler
//! ```

pub mod decode;
pub mod dispatch;
pub mod types;

pub use decode::{decode_callback, DecodeError};
pub use dispatch::{
    handler_fn, CallbackHandler, DispatchContext, DispatchOutcome, Dispatcher, HandlerError,
    HandlerFn,
};
pub use types::{Action, Callback, CallbackEvent, Channel, InteractionType, Team, User};
