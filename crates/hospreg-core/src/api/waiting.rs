use serde_json::json;

use super::require;
use crate::client::{ApiClient, ApiRequest};
use crate::error::ApiError;
use crate::models::{PatientWaitingList, WaitingCancellation, WaitingConfirmation, WaitingEntry, WaitingQueue};

/// Identifies one waitlist entry of one patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingKey {
    pub waiting_id: String,
    pub patient_id: String,
}

impl WaitingKey {
    pub fn new(waiting_id: impl Into<String>, patient_id: impl Into<String>) -> Self {
        Self {
            waiting_id: waiting_id.into(),
            patient_id: patient_id.into(),
        }
    }
}

impl ApiClient {
    /// Join the waitlist of a fully booked slot.
    pub async fn create_waiting_registration(
        &self,
        patient_id: &str,
        schedule_record_id: &str,
    ) -> Result<WaitingEntry, ApiError> {
        let outcome: Result<WaitingEntry, ApiError> = async {
            require("patientId", patient_id)?;
            require("scheduleRecordId", schedule_record_id)?;
            let request = ApiRequest::post("/api/registrations/waiting").payload(json!({
                "patientId": patient_id,
                "scheduleRecordId": schedule_record_id,
            }));
            self.call(request, "Failed to join the waiting list")
                .await?
                .into_typed()
        }
        .await;
        self.report(outcome, Some("Added to the waiting list"))
    }

    pub async fn cancel_waiting_registration(
        &self,
        key: &WaitingKey,
    ) -> Result<WaitingCancellation, ApiError> {
        let outcome: Result<WaitingCancellation, ApiError> = async {
            require("waitingId", &key.waiting_id)?;
            require("patientId", &key.patient_id)?;
            let request = ApiRequest::delete("/api/registrations/waiting").payload(json!({
                "waitingId": key.waiting_id,
                "patientId": key.patient_id,
            }));
            self.call(request, "Failed to cancel waiting registration")
                .await?
                .into_typed()
        }
        .await;
        self.report(outcome, Some("Waiting registration cancelled"))
    }

    pub async fn fetch_waiting_queue(&self, schedule_record_id: &str) -> Result<WaitingQueue, ApiError> {
        let outcome: Result<WaitingQueue, ApiError> = async {
            require("scheduleRecordId", schedule_record_id)?;
            let request = ApiRequest::get("/api/registrations/waiting")
                .payload(json!({ "scheduleRecordId": schedule_record_id }));
            self.call(request, "Failed to load the waiting queue")
                .await?
                .into_typed()
        }
        .await;
        self.report(outcome, None)
    }

    pub async fn fetch_patient_waiting(&self, patient_id: &str) -> Result<PatientWaitingList, ApiError> {
        let outcome: Result<PatientWaitingList, ApiError> = async {
            require("patientId", patient_id)?;
            let request = ApiRequest::get("/api/registrations/waiting/patient")
                .payload(json!({ "patientId": patient_id }));
            self.call(request, "Failed to load waiting registrations")
                .await?
                .into_typed()
        }
        .await;
        self.report(outcome, None)
    }

    /// Turn a waitlist entry into a confirmed booking.
    pub async fn confirm_waiting_registration(
        &self,
        waiting_id: &str,
    ) -> Result<WaitingConfirmation, ApiError> {
        let outcome: Result<WaitingConfirmation, ApiError> = async {
            require("waitingId", waiting_id)?;
            let request = ApiRequest::post("/api/registrations/waiting/confirm")
                .payload(json!({ "waitingId": waiting_id }));
            self.call(request, "Failed to confirm waiting registration")
                .await?
                .into_typed()
        }
        .await;
        self.report(outcome, Some("Waiting registration confirmed"))
    }
}
