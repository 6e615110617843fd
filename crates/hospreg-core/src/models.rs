//! Typed records exchanged with the registration backend.
//!
//! Fields are lenient: the backend omits keys and sends `null` freely, so
//! every record defaults missing, null or mistyped fields, and string fields
//! accept numbers as well. Only a payload of the wrong overall shape fails to
//! decode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => text,
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            _ => String::new(),
        })
    }

    pub fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = string(deserializer)?;
        Ok((!value.is_empty()).then_some(value))
    }

    /// Any value that does not fit `T`, `null` included, reads as the default.
    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }
}

/// Status of a booked appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RegistrationStatus {
    Booked,
    Cancelled,
    Completed,
    Unknown(String),
}

impl RegistrationStatus {
    pub fn label(&self) -> &str {
        match self {
            RegistrationStatus::Booked => "已预约",
            RegistrationStatus::Cancelled => "已取消",
            RegistrationStatus::Completed => "已就诊",
            RegistrationStatus::Unknown(raw) => raw,
        }
    }
}

impl Default for RegistrationStatus {
    fn default() -> Self {
        RegistrationStatus::Unknown(String::new())
    }
}

impl From<String> for RegistrationStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "已预约" | "booked" => RegistrationStatus::Booked,
            "已取消" | "cancelled" => RegistrationStatus::Cancelled,
            "已就诊" | "completed" => RegistrationStatus::Completed,
            _ => RegistrationStatus::Unknown(raw),
        }
    }
}

impl From<RegistrationStatus> for String {
    fn from(status: RegistrationStatus) -> Self {
        match status {
            RegistrationStatus::Unknown(raw) => raw,
            known => known.label().to_string(),
        }
    }
}

/// Status of a waitlist request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WaitingStatus {
    Queued,
    Confirmed,
    Cancelled,
    Unknown(String),
}

impl WaitingStatus {
    pub fn label(&self) -> &str {
        match self {
            WaitingStatus::Queued => "排队中",
            WaitingStatus::Confirmed => "已成功预约",
            WaitingStatus::Cancelled => "已取消",
            WaitingStatus::Unknown(raw) => raw,
        }
    }
}

impl Default for WaitingStatus {
    fn default() -> Self {
        WaitingStatus::Unknown(String::new())
    }
}

impl From<String> for WaitingStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "排队中" | "queued" => WaitingStatus::Queued,
            "已成功预约" | "confirmed" => WaitingStatus::Confirmed,
            "已取消" | "cancelled" => WaitingStatus::Cancelled,
            _ => WaitingStatus::Unknown(raw),
        }
    }
}

impl From<WaitingStatus> for String {
    fn from(status: WaitingStatus) -> Self {
        match status {
            WaitingStatus::Unknown(raw) => raw,
            known => known.label().to_string(),
        }
    }
}

/// Status of a payment order or prescription bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Cancelled,
    Refunded,
    Unknown(String),
}

impl PaymentStatus {
    pub fn label(&self) -> &str {
        match self {
            PaymentStatus::Unpaid => "待缴费",
            PaymentStatus::Paid => "已缴费",
            PaymentStatus::Cancelled => "已取消",
            PaymentStatus::Refunded => "已退款",
            PaymentStatus::Unknown(raw) => raw,
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Unknown(String::new())
    }
}

impl From<String> for PaymentStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "待缴费" | "待支付" | "unpaid" | "UNPAID" => PaymentStatus::Unpaid,
            "已缴费" | "已支付" | "paid" | "PAID" | "SUCCESS" => PaymentStatus::Paid,
            "已取消" | "cancelled" | "CANCELLED" => PaymentStatus::Cancelled,
            "已退款" | "refunded" | "REFUNDED" => PaymentStatus::Refunded,
            _ => PaymentStatus::Unknown(raw),
        }
    }
}

impl From<PaymentStatus> for String {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Unknown(raw) => raw,
            known => known.label().to_string(),
        }
    }
}

/// One page of results, normalized from any backend list shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub list: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

/// Plain acknowledgement body such as `{code: 200, message: "取消成功"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notice {
    #[serde(deserialize_with = "lenient::or_default")]
    pub code: Option<i64>,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub token: String,
    pub user_info: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisteredAccount {
    #[serde(deserialize_with = "lenient::optional_string")]
    pub user_id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub account: String,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Department {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub sub_departments: Vec<Department>,
}

impl Department {
    /// Case-insensitive keyword match on this department or any sub-department.
    pub fn matches(&self, keyword: &str) -> bool {
        let needle = keyword.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.sub_departments.iter().any(|sub| sub.matches(keyword))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleSlot {
    #[serde(deserialize_with = "lenient::string")]
    pub schedule_record_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub time_period_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub start_time: String,
    #[serde(deserialize_with = "lenient::string")]
    pub end_time: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub registration_fee: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub left_source_count: i64,
}

impl ScheduleSlot {
    pub fn has_capacity(&self) -> bool {
        self.left_source_count > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DoctorSchedule {
    #[serde(deserialize_with = "lenient::string")]
    pub doctor_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub doctor_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub doctor_title: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub schedules: Vec<ScheduleSlot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DoctorDetail {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(deserialize_with = "lenient::string")]
    pub specialty: String,
    #[serde(deserialize_with = "lenient::string")]
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Registration {
    #[serde(deserialize_with = "lenient::string")]
    pub patient_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub schedule_record_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub schedule_date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub time_period_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub register_time: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: RegistrationStatus,
    #[serde(deserialize_with = "lenient::string")]
    pub department_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub doctor_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationCancellation {
    #[serde(deserialize_with = "lenient::string")]
    pub patient_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub schedule_record_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: RegistrationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitingEntry {
    #[serde(deserialize_with = "lenient::string")]
    pub waiting_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub patient_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub schedule_record_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub apply_time: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: WaitingStatus,
    #[serde(deserialize_with = "lenient::or_default")]
    pub position: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitingQueue {
    #[serde(deserialize_with = "lenient::string")]
    pub schedule_record_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub waiting_count: u32,
    #[serde(deserialize_with = "lenient::or_default")]
    pub waiting_list: Vec<WaitingEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientWaitingList {
    #[serde(deserialize_with = "lenient::string")]
    pub patient_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub items: Vec<WaitingEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitingCancellation {
    #[serde(deserialize_with = "lenient::string")]
    pub waiting_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub patient_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: WaitingStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitingConfirmation {
    #[serde(deserialize_with = "lenient::string")]
    pub waiting_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: WaitingStatus,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub registration_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentOrder {
    #[serde(deserialize_with = "lenient::string")]
    pub order_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub patient_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub schedule_record_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub amount: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: PaymentStatus,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub created_at: Option<String>,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub paid_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentReceipt {
    #[serde(deserialize_with = "lenient::string")]
    pub order_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: PaymentStatus,
    #[serde(deserialize_with = "lenient::or_default")]
    pub amount: Option<f64>,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub paid_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Review {
    #[serde(deserialize_with = "lenient::optional_string")]
    pub review_id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub doctor_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub patient_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub rating: u8,
    #[serde(deserialize_with = "lenient::string")]
    pub content: String,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Feedback {
    #[serde(deserialize_with = "lenient::optional_string")]
    pub feedback_id: Option<String>,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub patient_id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub content: String,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub contact: Option<String>,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub reply: Option<String>,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Patient {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub relation: String,
    #[serde(deserialize_with = "lenient::string")]
    pub id_card: String,
    #[serde(deserialize_with = "lenient::string")]
    pub phone: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Prescription {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub department: String,
    #[serde(deserialize_with = "lenient::string")]
    pub doctor: String,
    #[serde(deserialize_with = "lenient::string")]
    pub diagnosis: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MedicalRecord {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub department: String,
    #[serde(deserialize_with = "lenient::string")]
    pub doctor: String,
    #[serde(deserialize_with = "lenient::string")]
    pub diagnosis: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Inspection {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub department: String,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InspectionItem {
    #[serde(deserialize_with = "lenient::string")]
    pub item: String,
    #[serde(deserialize_with = "lenient::string")]
    pub value: String,
    #[serde(deserialize_with = "lenient::string")]
    pub unit: String,
    #[serde(deserialize_with = "lenient::string")]
    pub range: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InspectionDetail {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub patient_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub department: String,
    #[serde(deserialize_with = "lenient::string")]
    pub doctor: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub details: Vec<InspectionItem>,
    #[serde(deserialize_with = "lenient::string")]
    pub conclusion: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registration_decodes_with_known_status() {
        let registration: Registration = serde_json::from_value(json!({
            "patientId": "PAT0001",
            "scheduleRecordId": "SCH1001",
            "status": "已预约",
            "doctorId": 7
        }))
        .unwrap();
        assert_eq!(registration.status, RegistrationStatus::Booked);
        assert_eq!(registration.doctor_id, "7");
        assert!(registration.schedule_date.is_empty());
    }

    #[test]
    fn unknown_status_is_preserved() {
        let status: WaitingStatus = serde_json::from_value(json!("处理中")).unwrap();
        assert_eq!(status, WaitingStatus::Unknown("处理中".to_string()));
        assert_eq!(serde_json::to_value(&status).unwrap(), json!("处理中"));
    }

    #[test]
    fn payment_status_accepts_synonyms() {
        assert_eq!(PaymentStatus::from("已支付".to_string()), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::from("待支付".to_string()), PaymentStatus::Unpaid);
        assert_eq!(String::from(PaymentStatus::Paid), "已缴费");
    }

    #[test]
    fn department_keyword_matches_sub_departments() {
        let department: Department = serde_json::from_value(json!({
            "id": "DEP001",
            "name": "内科",
            "subDepartments": [{"id": "DEP005", "name": "心内科门诊"}]
        }))
        .unwrap();
        assert!(department.matches("心内"));
        assert!(department.matches("内科"));
        assert!(!department.matches("骨科"));
    }

    #[test]
    fn optional_ids_treat_null_as_absent() {
        let confirmation: WaitingConfirmation = serde_json::from_value(json!({
            "waitingId": "WAIT1",
            "status": "已成功预约",
            "registrationId": null
        }))
        .unwrap();
        assert_eq!(confirmation.status, WaitingStatus::Confirmed);
        assert_eq!(confirmation.registration_id, None);
    }

    #[test]
    fn null_and_mistyped_fields_fall_back_to_defaults() {
        let registration: Registration = serde_json::from_value(json!({
            "patientId": "PAT0001",
            "scheduleDate": null,
            "timePeriodName": null,
            "status": null,
            "doctorId": null
        }))
        .unwrap();
        assert_eq!(registration.patient_id, "PAT0001");
        assert!(registration.schedule_date.is_empty());
        assert_eq!(registration.status, RegistrationStatus::default());

        let order: PaymentOrder = serde_json::from_value(json!({
            "orderId": 42,
            "amount": "twenty",
            "status": null,
            "paidAt": null
        }))
        .unwrap();
        assert_eq!(order.order_id, "42");
        assert_eq!(order.amount, 0.0);
        assert_eq!(order.paid_at, None);

        let queue: WaitingQueue = serde_json::from_value(json!({
            "waitingCount": null,
            "waitingList": null
        }))
        .unwrap();
        assert_eq!(queue.waiting_count, 0);
        assert!(queue.waiting_list.is_empty());
    }
}
