use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::require;
use crate::client::{ApiClient, ApiRequest};
use crate::error::{ApiError, RawResponse};
use crate::events::NoticeStyle;
use crate::models::{LoginResult, Notice, RegisteredAccount};
use crate::session::{IdentityLookup, extract_patient_id};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern compiles")
});

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1[3-9]\d{9}$").expect("phone pattern compiles"));

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub account: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub account: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    pub phone: String,
    pub new_password: String,
}

fn check_email(email: &str) -> Result<(), ApiError> {
    require("email", email)?;
    if !EMAIL_PATTERN.is_match(email.trim()) {
        return Err(ApiError::validation(format!("invalid email address: {email}")));
    }
    Ok(())
}

fn check_phone(phone: &str) -> Result<(), ApiError> {
    require("phone", phone)?;
    if !PHONE_PATTERN.is_match(phone.trim()) {
        return Err(ApiError::validation(format!("invalid phone number: {phone}")));
    }
    Ok(())
}

/// The login payload is either the bare token or `{token, userInfo}`.
fn login_result(status: u16, payload: Value) -> Result<LoginResult, ApiError> {
    let (token, user_info) = match &payload {
        Value::String(token) => (token.clone(), Map::new()),
        Value::Object(map) => (
            map.get("token")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            map.get("userInfo")
                .or_else(|| map.get("user"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        ),
        _ => (String::new(), Map::new()),
    };
    if token.is_empty() {
        return Err(ApiError::decode(
            "login response carried no token",
            RawResponse {
                status,
                body: payload,
            },
        ));
    }
    Ok(LoginResult { token, user_info })
}

/// `/user/patient-id` answers with the id itself or an object holding it.
fn patient_id_from(payload: &Value) -> Option<String> {
    match payload {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        Value::Object(map) => extract_patient_id(map),
        _ => None,
    }
}

impl ApiClient {
    /// Sign in and store the token, account and profile in the session.
    pub async fn login_user(&self, credentials: &Credentials) -> Result<LoginResult, ApiError> {
        let outcome: Result<LoginResult, ApiError> = async {
            require("account", &credentials.account)?;
            require("password", &credentials.password)?;
            let request = ApiRequest::post("/user/login").payload(json!(credentials));
            let reply = self.call(request, "Login failed").await?;
            let status = reply.status;
            let result = login_result(status, reply.into_value())?;

            let session = self.session();
            session.set_token(&result.token);
            session.set_account(&credentials.account);
            if !result.user_info.is_empty() {
                session.set_user(Value::Object(result.user_info.clone()));
            }
            info!(account = %credentials.account, "Logged in");
            Ok(result)
        }
        .await;
        self.report(outcome, Some("Login successful"))
    }

    pub async fn register_user(&self, account: &NewAccount) -> Result<RegisteredAccount, ApiError> {
        let outcome: Result<RegisteredAccount, ApiError> = async {
            require("account", &account.account)?;
            require("password", &account.password)?;
            if let Some(email) = &account.email {
                check_email(email)?;
            }
            if let Some(phone) = &account.phone {
                check_phone(phone)?;
            }
            let request = ApiRequest::post("/user/register").payload(json!(account));
            self.call(request, "Registration failed").await?.into_typed()
        }
        .await;
        self.report(outcome, Some("Registration successful"))
    }

    /// Patient id bound to a login account, if the backend knows one.
    pub async fn lookup_patient_id(&self, account: &str) -> Result<Option<String>, ApiError> {
        let outcome = self.resolve_patient_id(account).await;
        self.report(outcome, None)
    }

    async fn resolve_patient_id(&self, account: &str) -> Result<Option<String>, ApiError> {
        require("account", account)?;
        let request = ApiRequest::get("/user/patient-id").payload(json!({ "account": account }));
        let reply = self.call(request, "Patient lookup failed").await?;
        Ok(patient_id_from(&reply.into_value()))
    }

    /// Resolve (and cache) the signed-in patient's id.
    pub async fn ensure_patient_id(&self) -> Option<String> {
        self.session().ensure_patient_id(self).await
    }

    pub async fn send_email_code(&self, email: &str) -> Result<Notice, ApiError> {
        let outcome: Result<Notice, ApiError> = async {
            check_email(email)?;
            let request = ApiRequest::post("/user/email/code").payload(json!({ "email": email.trim() }));
            Ok(self.call(request, "Failed to send verification code").await?.into_notice())
        }
        .await;
        self.report(outcome, Some("Verification code sent"))
    }

    pub async fn verify_email(&self, email: &str, code: &str) -> Result<Notice, ApiError> {
        let outcome: Result<Notice, ApiError> = async {
            check_email(email)?;
            require("code", code)?;
            let request = ApiRequest::post("/user/email/verify")
                .payload(json!({ "email": email.trim(), "code": code.trim() }));
            Ok(self.call(request, "Email verification failed").await?.into_notice())
        }
        .await;
        self.report(outcome, Some("Email verified"))
    }

    pub async fn reset_password(&self, reset: &PasswordReset) -> Result<Notice, ApiError> {
        let outcome: Result<Notice, ApiError> = async {
            check_phone(&reset.phone)?;
            require("newPassword", &reset.new_password)?;
            let request = ApiRequest::post("/api/forget-pwd").payload(json!(reset));
            Ok(self.call(request, "Password reset failed").await?.into_notice())
        }
        .await;
        self.report(outcome, Some("Password reset"))
    }

    /// Drop the local session. The backend keeps no session state to revoke.
    pub fn logout_user(&self) {
        self.session().logout();
        self.events().notify("Logged out", NoticeStyle::Success);
    }
}

impl IdentityLookup for ApiClient {
    async fn lookup_patient_id(&self, account: &str) -> Result<Option<String>, ApiError> {
        self.resolve_patient_id(account).await
    }

    async fn current_identity(&self, path: &str) -> Result<Value, ApiError> {
        debug!(path, "Fetching current identity");
        Ok(self
            .call(ApiRequest::get(path), "Identity lookup failed")
            .await?
            .into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_result_from_bare_token() {
        let result = login_result(200, json!("mock-token-testuser")).unwrap();
        assert_eq!(result.token, "mock-token-testuser");
        assert!(result.user_info.is_empty());
    }

    #[test]
    fn login_result_from_object() {
        let result = login_result(
            200,
            json!({"token": "t", "userInfo": {"patientId": "PAT0001"}}),
        )
        .unwrap();
        assert_eq!(result.token, "t");
        assert_eq!(result.user_info["patientId"], "PAT0001");
    }

    #[test]
    fn login_result_without_token_is_decode_error() {
        let err = login_result(200, json!({"userInfo": {}})).unwrap_err();
        assert!(matches!(err.kind(), crate::error::ApiErrorKind::Decode { .. }));
    }

    #[test]
    fn patient_id_shapes() {
        assert_eq!(patient_id_from(&json!("PAT0001")).as_deref(), Some("PAT0001"));
        assert_eq!(patient_id_from(&json!(42)).as_deref(), Some("42"));
        assert_eq!(
            patient_id_from(&json!({"patientId": "PAT0002"})).as_deref(),
            Some("PAT0002")
        );
        assert_eq!(patient_id_from(&json!("")), None);
        assert_eq!(patient_id_from(&Value::Null), None);
    }

    #[test]
    fn email_and_phone_validation() {
        assert!(check_email("someone@example.com").is_ok());
        assert!(check_email("not-an-email").unwrap_err().is_validation());
        assert!(check_phone("13800138000").is_ok());
        assert!(check_phone("12345").unwrap_err().is_validation());
    }
}
