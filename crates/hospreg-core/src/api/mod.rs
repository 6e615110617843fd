//! Domain operations, one module per backend area. Each operation validates
//! its arguments, sends one request, classifies the reply and reports the
//! outcome on the client's event bus.

mod auth;
mod catalog;
mod feedback;
mod payments;
mod profile;
mod records;
mod registrations;
mod reviews;
mod waiting;

pub use auth::{Credentials, NewAccount, PasswordReset};
pub use catalog::ScheduleQuery;
pub use feedback::NewFeedback;
pub use payments::PaymentQuery;
pub use profile::NewPatient;
pub use registrations::{RegistrationKey, RegistrationQuery};
pub use reviews::{NewReview, ReviewQuery};
pub use waiting::WaitingKey;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::client::{ApiClient, ApiRequest};
use crate::envelope::{
    PageRequest, envelope_code, extract_message, normalize_page, settle, unwrap_list,
};
use crate::error::{ApiError, RawResponse};
use crate::events::NoticeStyle;
use crate::models::{Notice, Page};

pub(crate) fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(())
}

/// Unwrapped payload of a successful reply, with the status kept for
/// decode diagnostics and the envelope's code and message kept for
/// acknowledgements.
pub(crate) struct Reply {
    status: u16,
    code: Option<i64>,
    message: Option<String>,
    payload: Value,
}

impl Reply {
    fn decode_failure(&self, err: serde_json::Error) -> ApiError {
        ApiError::decode(
            err.to_string(),
            RawResponse {
                status: self.status,
                body: self.payload.clone(),
            },
        )
    }

    pub(crate) fn into_value(self) -> Value {
        self.payload
    }

    pub(crate) fn into_typed<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let payload = match &self.payload {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(payload).map_err(|err| self.decode_failure(err))
    }

    /// Acknowledgement of a write. Never fails: a payload that is not an
    /// object (`"ok"`, `true`, an id) yields the envelope's code and message.
    pub(crate) fn into_notice(self) -> Notice {
        let notice: Notice = match self.payload {
            payload @ Value::Object(_) => serde_json::from_value(payload).unwrap_or_default(),
            _ => Notice::default(),
        };
        Notice {
            code: notice.code.or(self.code),
            message: notice.message.or(self.message),
        }
    }

    pub(crate) fn into_list<T: DeserializeOwned>(self) -> Result<Vec<T>, ApiError> {
        let items = unwrap_list(self.payload.clone());
        serde_json::from_value(Value::Array(items)).map_err(|err| self.decode_failure(err))
    }

    pub(crate) fn into_page<T: DeserializeOwned>(
        self,
        requested: PageRequest,
    ) -> Result<Page<T>, ApiError> {
        let parts = normalize_page(self.payload.clone(), requested);
        let list = serde_json::from_value(Value::Array(parts.list))
            .map_err(|err| self.decode_failure(err))?;
        Ok(Page {
            list,
            page: parts.page,
            page_size: parts.page_size,
            total: parts.total,
        })
    }
}

impl ApiClient {
    /// Send a request and settle it into a payload or a business error.
    pub(crate) async fn call(&self, request: ApiRequest, fallback: &str) -> Result<Reply, ApiError> {
        let raw = self.request(request).await?;
        let status = raw.status;
        let code = envelope_code(&raw.body);
        let message = extract_message(&raw.body);
        let payload = settle(raw, fallback)?;
        Ok(Reply {
            status,
            code,
            message,
            payload,
        })
    }

    /// Publish the outcome of an operation. A failure is announced once and
    /// comes back silent so callers can handle it without a second message.
    pub(crate) fn report<T>(
        &self,
        outcome: Result<T, ApiError>,
        success: Option<&str>,
    ) -> Result<T, ApiError> {
        match outcome {
            Ok(value) => {
                if let Some(text) = success {
                    self.events().notify(text, NoticeStyle::Success);
                }
                Ok(value)
            }
            Err(err) if err.is_silent() => Err(err),
            Err(err) => {
                warn!(error = %err, "Operation failed");
                self.events().notify(err.message(), NoticeStyle::Neutral);
                Err(err.silenced())
            }
        }
    }
}
