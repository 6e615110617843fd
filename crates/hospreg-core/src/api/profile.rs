use serde::Serialize;
use serde_json::{Map, Value, json};

use super::require;
use crate::client::{ApiClient, ApiRequest};
use crate::error::ApiError;
use crate::models::{Notice, Patient};

/// A person the account may book for.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    pub name: String,
    pub relation: String,
    pub id_card: String,
    pub phone: String,
    pub is_default: bool,
}

impl ApiClient {
    /// Account profile as the backend returns it.
    pub async fn fetch_profile(&self) -> Result<Map<String, Value>, ApiError> {
        let outcome: Result<Map<String, Value>, ApiError> = async {
            self.call(ApiRequest::get("/api/profile"), "Failed to load profile")
                .await?
                .into_typed()
        }
        .await;
        self.report(outcome, None)
    }

    /// Update the profile and merge the accepted fields into the session.
    pub async fn update_profile(&self, fields: Map<String, Value>) -> Result<Notice, ApiError> {
        let outcome: Result<Notice, ApiError> = async {
            if fields.is_empty() {
                return Err(ApiError::validation("no profile fields to update"));
            }
            let request = ApiRequest::put("/api/profile").payload(Value::Object(fields.clone()));
            let notice = self
                .call(request, "Failed to update profile")
                .await?
                .into_notice();
            self.session().merge_user(fields);
            Ok(notice)
        }
        .await;
        self.report(outcome, Some("Profile updated"))
    }

    pub async fn fetch_patients(&self) -> Result<Vec<Patient>, ApiError> {
        let outcome: Result<Vec<Patient>, ApiError> = async {
            self.call(ApiRequest::get("/api/patients"), "Failed to load patients")
                .await?
                .into_list()
        }
        .await;
        self.report(outcome, None)
    }

    pub async fn add_patient(&self, patient: &NewPatient) -> Result<Notice, ApiError> {
        let outcome: Result<Notice, ApiError> = async {
            require("name", &patient.name)?;
            require("idCard", &patient.id_card)?;
            require("phone", &patient.phone)?;
            let request = ApiRequest::post("/api/patients").payload(json!(patient));
            Ok(self.call(request, "Failed to add patient").await?.into_notice())
        }
        .await;
        self.report(outcome, Some("Patient added"))
    }
}
