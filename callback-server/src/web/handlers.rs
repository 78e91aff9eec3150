//! Interaction callback endpoint.
//!
//! Each request goes strictly through
//! `received → signature-checked → decoded → dispatched → responded`.
//! Any failure short-circuits to the response; the decoder never sees bytes
//! that failed verification.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::config::{ServerConfig, SigningSecret};
use crate::interaction::{
    decode_callback, Callback, CallbackHandler, DecodeError, DispatchOutcome, Dispatcher,
    HandlerError,
};
use crate::web::signature::{BodyError, SecretsVerifier, VerifyError, TIMESTAMP_HEADER};
use crate::web::trace::{RequestCounter, RequestTrace};

/// Shared state of the callback endpoint.
pub struct CallbackState<H> {
    secret: SigningSecret,
    counter: Arc<RequestCounter>,
    dispatcher: Dispatcher<H>,
    signature_max_age: Duration,
    max_body_bytes: usize,
}

impl<H: CallbackHandler> CallbackState<H> {
    pub fn new(config: &ServerConfig, handler: H, counter: Arc<RequestCounter>) -> Self {
        Self {
            secret: config.secret.clone(),
            counter,
            dispatcher: Dispatcher::new(handler, config.dispatch_deadline),
            signature_max_age: config.signature_max_age,
            max_body_bytes: config.max_body_bytes,
        }
    }

    async fn handle(
        &self,
        trace: RequestTrace,
        deadline: Instant,
        headers: HeaderMap,
        body: Body,
    ) -> Result<StatusCode, CallbackError> {
        let mut verifier = SecretsVerifier::new(&headers, &self.secret, self.signature_max_age)
            .map_err(|e| {
                if e.is_rejection() {
                    warn!(error = %e, "slack_signature_rejected");
                    CallbackError::Unauthorized(e)
                } else {
                    warn!(error = %e, "slack_verifier_setup_failed");
                    CallbackError::VerifierSetup(e)
                }
            })?;

        let raw = tokio::time::timeout_at(deadline, verifier.tee(body, self.max_body_bytes))
            .await
            .map_err(|_| {
                warn!(
                    deadline_ms = self.dispatcher.deadline().as_millis() as u64,
                    "slack_body_read_timed_out"
                );
                CallbackError::ReadTimeout
            })?
            .inspect_err(|e| warn!(error = %e, "slack_body_read_failed"))?;

        if let Err(e) = verifier.ensure() {
            warn!(error = %e, body_length = raw.len(), "slack_signature_invalid");
            return Err(CallbackError::Unauthorized(e));
        }

        let event = decode_callback(&raw).inspect_err(|e| {
            warn!(error = %e, detail = ?e, body_length = raw.len(), "slack_payload_invalid")
        })?;

        debug!(
            interaction_type = %event.kind,
            callback_id = %event.callback_id,
            actions = event.actions.len(),
            "slack_callback_verified"
        );

        let callback = Callback::new(trace, event);
        match self.dispatcher.dispatch_until(deadline, callback).await {
            DispatchOutcome::Completed => {
                debug!("slack_callback_processed");
                Ok(StatusCode::OK)
            }
            DispatchOutcome::Transient(e) => {
                warn!(
                    error = %e,
                    deadline_ms = self.dispatcher.deadline().as_millis() as u64,
                    "slack_callback_overloaded"
                );
                Err(CallbackError::Transient(e))
            }
            DispatchOutcome::Internal(e) => {
                error!(error = %e, detail = ?e, "slack_callback_failed");
                Err(CallbackError::Internal(e))
            }
        }
    }
}

/// Request failures, each mapped to one status code.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("signature verifier could not be set up")]
    VerifierSetup(#[source] VerifyError),

    #[error("request signature rejected")]
    Unauthorized(#[source] VerifyError),

    #[error(transparent)]
    Body(#[from] BodyError),

    #[error("request body was not received before the deadline")]
    ReadTimeout,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("interaction handling timed out or was cancelled")]
    Transient(#[source] HandlerError),

    #[error("interaction handling failed")]
    Internal(#[source] HandlerError),
}

impl CallbackError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::VerifierSetup(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::ReadTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}

/// Slack interaction callback endpoint.
///
/// Responds with an empty body:
/// - 200 when the handler succeeded
/// - 401 when the signature is missing, stale or wrong
/// - 400 when the body can't be read or decoded
/// - 503 when the body or the handler ran out of time, or the handler was
///   cancelled
///
/// The deadline is fixed when the request arrives and covers reading the
/// body as well as the handler.
/// - 500 when the verifier can't be set up or the handler failed
pub async fn process_callback<H: CallbackHandler>(
    State(state): State<Arc<CallbackState<H>>>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, CallbackError> {
    let deadline = Instant::now() + state.dispatcher.deadline();
    let trace = state.counter.next_trace(timestamp_hint(&headers));
    let span = info_span!("slack_callback", slack_http_id = %trace);

    state
        .handle(trace, deadline, headers, body)
        .instrument(span)
        .await
}

fn timestamp_hint(headers: &HeaderMap) -> &str {
    headers
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
