//! Web server module for Slack interaction callbacks.
//!
//! This module provides the callback endpoint that:
//! - Verifies the Slack request signature while reading the body
//! - Decodes the interaction payload
//! - Runs the injected handler under a deadline
//! - Answers with an empty body and a status code
//!
//! Every request is tagged with a [`RequestTrace`] for log correlation.

pub mod handlers;
pub mod server;
pub mod signature;
pub mod trace;

pub use handlers::{process_callback, CallbackError, CallbackState};
pub use server::{CallbackServer, ServerError, ShutdownHandle};
pub use signature::{sign, BodyError, SecretsVerifier, VerifyError, SIGNATURE_HEADER, TIMESTAMP_HEADER};
pub use trace::{RequestCounter, RequestTrace};
