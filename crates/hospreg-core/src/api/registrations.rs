use serde_json::{Map, Value, json};

use super::require;
use crate::client::{ApiClient, ApiRequest};
use crate::envelope::PageRequest;
use crate::error::ApiError;
use crate::models::{Notice, Page, Registration, RegistrationCancellation, RegistrationStatus};

/// Composite key of one booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationKey {
    pub patient_id: String,
    pub schedule_record_id: String,
}

impl RegistrationKey {
    pub fn new(patient_id: impl Into<String>, schedule_record_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            schedule_record_id: schedule_record_id.into(),
        }
    }

    fn validate(&self) -> Result<(), ApiError> {
        require("patientId", &self.patient_id)?;
        require("scheduleRecordId", &self.schedule_record_id)
    }

    fn to_payload(&self) -> Value {
        json!({
            "patientId": self.patient_id,
            "scheduleRecordId": self.schedule_record_id,
        })
    }
}

/// A patient's bookings, one page at a time. `status: None` lists all.
#[derive(Debug, Clone)]
pub struct RegistrationQuery {
    pub patient_id: String,
    pub page: PageRequest,
    pub status: Option<RegistrationStatus>,
}

impl RegistrationQuery {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            page: PageRequest::default(),
            status: None,
        }
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = PageRequest { page, page_size };
        self
    }

    pub fn status(mut self, status: RegistrationStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn to_payload(&self) -> Value {
        let mut params = Map::new();
        params.insert("patientId".into(), json!(self.patient_id));
        params.insert("page".into(), json!(self.page.page));
        params.insert("pageSize".into(), json!(self.page.page_size));
        if let Some(status) = &self.status {
            params.insert("status".into(), json!(status.label()));
        }
        Value::Object(params)
    }
}

impl ApiClient {
    pub async fn fetch_registrations(
        &self,
        query: &RegistrationQuery,
    ) -> Result<Page<Registration>, ApiError> {
        let outcome: Result<Page<Registration>, ApiError> = async {
            require("patientId", &query.patient_id)?;
            let request = ApiRequest::get("/api/registrations").payload(query.to_payload());
            self.call(request, "Failed to load registrations")
                .await?
                .into_page(query.page)
        }
        .await;
        self.report(outcome, None)
    }

    pub async fn create_registration(&self, key: &RegistrationKey) -> Result<Notice, ApiError> {
        let outcome: Result<Notice, ApiError> = async {
            key.validate()?;
            let request = ApiRequest::post("/api/registrations").payload(key.to_payload());
            let reply = self.call(request, "Failed to create registration").await?;
            Ok(reply.into_notice())
        }
        .await;
        self.report(outcome, Some("Registration created"))
    }

    pub async fn fetch_registration(&self, key: &RegistrationKey) -> Result<Registration, ApiError> {
        let outcome: Result<Registration, ApiError> = async {
            key.validate()?;
            let request = ApiRequest::get("/api/registrations/by-key").payload(key.to_payload());
            self.call(request, "Failed to load registration")
                .await?
                .into_typed()
        }
        .await;
        self.report(outcome, None)
    }

    /// Cancel by composite key (`DELETE` with the key in the query string).
    pub async fn cancel_registration(
        &self,
        key: &RegistrationKey,
    ) -> Result<RegistrationCancellation, ApiError> {
        let outcome: Result<RegistrationCancellation, ApiError> = async {
            key.validate()?;
            let request = ApiRequest::delete("/api/registrations").payload(key.to_payload());
            self.call(request, "Failed to cancel registration")
                .await?
                .into_typed()
        }
        .await;
        self.report(outcome, Some("Registration cancelled"))
    }

    /// Cancel whichever booking holds `schedule_record_id`.
    pub async fn cancel_registration_by_schedule(
        &self,
        schedule_record_id: &str,
    ) -> Result<Notice, ApiError> {
        let outcome: Result<Notice, ApiError> = async {
            require("scheduleRecordId", schedule_record_id)?;
            let path = format!(
                "/api/registrations/cancel/{}",
                urlencoding::encode(schedule_record_id.trim())
            );
            let reply = self
                .call(ApiRequest::post(path), "Failed to cancel registration")
                .await?;
            Ok(reply.into_notice())
        }
        .await;
        self.report(outcome, Some("Registration cancelled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_payload_omits_absent_status() {
        let payload = RegistrationQuery::new("PAT0001").page(2, 5).to_payload();
        assert_eq!(
            payload,
            json!({"patientId": "PAT0001", "page": 2, "pageSize": 5})
        );
    }

    #[test]
    fn query_payload_sends_status_label() {
        let payload = RegistrationQuery::new("PAT0001")
            .status(RegistrationStatus::Cancelled)
            .to_payload();
        assert_eq!(payload["status"], "已取消");
    }

    #[test]
    fn key_requires_both_parts() {
        assert!(RegistrationKey::new("PAT0001", "").validate().unwrap_err().is_validation());
        assert!(RegistrationKey::new("PAT0001", "SCH1001").validate().is_ok());
    }
}
