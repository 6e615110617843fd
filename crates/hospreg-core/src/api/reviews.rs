use serde::Serialize;
use serde_json::{Map, Value, json};

use super::require;
use crate::client::{ApiClient, ApiRequest};
use crate::envelope::PageRequest;
use crate::error::ApiError;
use crate::models::{Notice, Page, Review};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub doctor_id: String,
    pub patient_id: String,
    pub rating: u8,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_record_id: Option<String>,
}

impl NewReview {
    fn validate(&self) -> Result<(), ApiError> {
        require("doctorId", &self.doctor_id)?;
        require("patientId", &self.patient_id)?;
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(ApiError::validation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        Ok(())
    }
}

/// Reviews filtered by doctor and/or patient.
#[derive(Debug, Clone, Default)]
pub struct ReviewQuery {
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
    pub page: PageRequest,
}

impl ReviewQuery {
    fn to_payload(&self) -> Value {
        let mut params = Map::new();
        if let Some(doctor_id) = &self.doctor_id {
            params.insert("doctorId".into(), json!(doctor_id));
        }
        if let Some(patient_id) = &self.patient_id {
            params.insert("patientId".into(), json!(patient_id));
        }
        params.insert("page".into(), json!(self.page.page));
        params.insert("pageSize".into(), json!(self.page.page_size));
        Value::Object(params)
    }
}

impl ApiClient {
    pub async fn submit_review(&self, review: &NewReview) -> Result<Notice, ApiError> {
        let outcome: Result<Notice, ApiError> = async {
            review.validate()?;
            let request = ApiRequest::post("/api/reviews").payload(json!(review));
            Ok(self.call(request, "Failed to submit review").await?.into_notice())
        }
        .await;
        self.report(outcome, Some("Review submitted"))
    }

    pub async fn fetch_reviews(&self, query: &ReviewQuery) -> Result<Page<Review>, ApiError> {
        let outcome: Result<Page<Review>, ApiError> = async {
            let request = ApiRequest::get("/api/reviews").payload(query.to_payload());
            self.call(request, "Failed to load reviews")
                .await?
                .into_page(query.page)
        }
        .await;
        self.report(outcome, None)
    }
}
