use serde::Serialize;
use serde_json::json;

use super::require;
use crate::client::{ApiClient, ApiRequest};
use crate::envelope::PageRequest;
use crate::error::ApiError;
use crate::models::{Feedback, Notice, Page};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeedback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl ApiClient {
    pub async fn submit_feedback(&self, feedback: &NewFeedback) -> Result<Notice, ApiError> {
        let outcome: Result<Notice, ApiError> = async {
            require("content", &feedback.content)?;
            let request = ApiRequest::post("/api/feedback").payload(json!(feedback));
            Ok(self.call(request, "Failed to submit feedback").await?.into_notice())
        }
        .await;
        self.report(outcome, Some("Feedback submitted"))
    }

    pub async fn fetch_feedback(
        &self,
        patient_id: &str,
        page: PageRequest,
    ) -> Result<Page<Feedback>, ApiError> {
        let outcome: Result<Page<Feedback>, ApiError> = async {
            require("patientId", patient_id)?;
            let request = ApiRequest::get("/api/feedback").payload(json!({
                "patientId": patient_id,
                "page": page.page,
                "pageSize": page.page_size,
            }));
            self.call(request, "Failed to load feedback")
                .await?
                .into_page(page)
        }
        .await;
        self.report(outcome, None)
    }
}
