use chrono::{Local, NaiveDate};
use serde_json::json;

use super::require;
use crate::client::{ApiClient, ApiRequest};
use crate::error::ApiError;
use crate::models::{Department, DoctorDetail, DoctorSchedule};

/// Doctor schedules for one department. `date` defaults to today.
#[derive(Debug, Clone, Default)]
pub struct ScheduleQuery {
    pub department_id: String,
    pub date: Option<NaiveDate>,
}

impl ScheduleQuery {
    pub fn new(department_id: impl Into<String>) -> Self {
        Self {
            department_id: department_id.into(),
            date: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

/// Keep departments whose own name or any sub-department matches. Matching
/// sub-departments are narrowed unless the parent itself matches.
pub fn filter_departments(departments: Vec<Department>, keyword: &str) -> Vec<Department> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return departments;
    }
    let needle = keyword.to_lowercase();
    departments
        .into_iter()
        .filter(|department| department.matches(keyword))
        .map(|mut department| {
            if !department.name.to_lowercase().contains(&needle) {
                department.sub_departments.retain(|sub| sub.matches(keyword));
            }
            department
        })
        .collect()
}

impl ApiClient {
    pub async fn fetch_departments(&self) -> Result<Vec<Department>, ApiError> {
        let outcome: Result<Vec<Department>, ApiError> = async {
            self.call(ApiRequest::get("/api/departments"), "Failed to load departments")
                .await?
                .into_list()
        }
        .await;
        self.report(outcome, None)
    }

    /// Fetch departments and filter them locally by keyword.
    pub async fn search_departments(&self, keyword: &str) -> Result<Vec<Department>, ApiError> {
        let departments = self.fetch_departments().await?;
        Ok(filter_departments(departments, keyword))
    }

    pub async fn fetch_doctor_schedules(
        &self,
        query: &ScheduleQuery,
    ) -> Result<Vec<DoctorSchedule>, ApiError> {
        let outcome: Result<Vec<DoctorSchedule>, ApiError> = async {
            require("departmentId", &query.department_id)?;
            let date = query.date.unwrap_or_else(|| Local::now().date_naive());
            let request = ApiRequest::get("/api/registration/doctors").payload(json!({
                "departmentId": query.department_id,
                "date": date.format("%Y-%m-%d").to_string(),
            }));
            self.call(request, "Failed to load doctor schedules")
                .await?
                .into_list()
        }
        .await;
        self.report(outcome, None)
    }

    pub async fn fetch_doctor_detail(&self, doctor_id: &str) -> Result<DoctorDetail, ApiError> {
        let outcome: Result<DoctorDetail, ApiError> = async {
            require("doctorId", doctor_id)?;
            let path = format!("/api/doctors/{}", urlencoding::encode(doctor_id.trim()));
            self.call(ApiRequest::get(path), "Failed to load doctor details")
                .await?
                .into_typed()
        }
        .await;
        self.report(outcome, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn department(id: &str, name: &str, subs: &[(&str, &str)]) -> Department {
        Department {
            id: id.to_string(),
            name: name.to_string(),
            sub_departments: subs
                .iter()
                .map(|(id, name)| department(id, name, &[]))
                .collect(),
        }
    }

    fn sample() -> Vec<Department> {
        vec![
            department(
                "DEP001",
                "内科",
                &[("DEP005", "心内科门诊"), ("DEP006", "肾内科门诊")],
            ),
            department("DEP002", "外科", &[("DEP011", "骨科门诊")]),
        ]
    }

    #[test]
    fn blank_keyword_keeps_everything() {
        assert_eq!(filter_departments(sample(), "  ").len(), 2);
    }

    #[test]
    fn sub_department_match_narrows_children() {
        let found = filter_departments(sample(), "骨科");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "DEP002");
        assert_eq!(found[0].sub_departments.len(), 1);
    }

    #[test]
    fn parent_match_keeps_all_children() {
        let found = filter_departments(sample(), "内科");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].sub_departments.len(), 2);
    }

    #[test]
    fn keyword_match_ignores_case() {
        let departments = vec![department("D1", "ENT Clinic", &[])];
        assert_eq!(filter_departments(departments, "ent").len(), 1);
    }

    #[test]
    fn schedule_query_builder() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        let query = ScheduleQuery::new("DEP005").on(date);
        assert_eq!(query.department_id, "DEP005");
        assert_eq!(query.date, Some(date));
    }
}
