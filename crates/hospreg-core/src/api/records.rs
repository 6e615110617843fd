use super::require;
use crate::client::{ApiClient, ApiRequest};
use crate::error::ApiError;
use crate::models::{Inspection, InspectionDetail, MedicalRecord, Prescription};

impl ApiClient {
    pub async fn fetch_prescriptions(&self) -> Result<Vec<Prescription>, ApiError> {
        let outcome: Result<Vec<Prescription>, ApiError> = async {
            self.call(ApiRequest::get("/api/prescriptions"), "Failed to load prescriptions")
                .await?
                .into_list()
        }
        .await;
        self.report(outcome, None)
    }

    pub async fn fetch_medical_records(&self) -> Result<Vec<MedicalRecord>, ApiError> {
        let outcome: Result<Vec<MedicalRecord>, ApiError> = async {
            self.call(ApiRequest::get("/api/records"), "Failed to load medical records")
                .await?
                .into_list()
        }
        .await;
        self.report(outcome, None)
    }

    pub async fn fetch_inspections(&self) -> Result<Vec<Inspection>, ApiError> {
        let outcome: Result<Vec<Inspection>, ApiError> = async {
            self.call(ApiRequest::get("/api/inspections"), "Failed to load inspection reports")
                .await?
                .into_list()
        }
        .await;
        self.report(outcome, None)
    }

    pub async fn fetch_inspection_detail(
        &self,
        inspection_id: &str,
    ) -> Result<InspectionDetail, ApiError> {
        let outcome: Result<InspectionDetail, ApiError> = async {
            require("inspectionId", inspection_id)?;
            let path = format!(
                "/api/inspections/{}",
                urlencoding::encode(inspection_id.trim())
            );
            self.call(ApiRequest::get(path), "Failed to load inspection report")
                .await?
                .into_typed()
        }
        .await;
        self.report(outcome, None)
    }
}
