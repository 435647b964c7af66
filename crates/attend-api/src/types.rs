use serde::{Deserialize, Serialize};

/// Employee record returned by `verify-id`, persisted under the `employee` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub employee_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub face_registered: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyIdRequest<'a> {
    pub employee_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyIdResponse {
    pub success: bool,
    pub employee: Employee,
    /// Bearer token for subsequent attendance calls, when the backend issues one.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ValidateLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterFaceRequest<'a> {
    pub employee_id: &'a str,
    pub image_base64: &'a str,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterFaceResponse {
    pub success: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CheckInRequest<'a> {
    pub image_base64: &'a str,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CheckOutRequest<'a> {
    pub image_base64: &'a str,
}

/// Response to check-in and check-out.
#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub date: String,
    #[serde(default)]
    pub check_in_time: Option<String>,
    #[serde(default)]
    pub check_out_time: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "id_string")]
    pub attendance_id: Option<String>,
}

/// Attendance ids arrive as strings or integers depending on the backend store.
fn id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    pub success: bool,
    #[serde(default)]
    pub history: Vec<AttendanceRecord>,
}

/// Error body shape shared by every endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ErrorBody {
    pub success: Option<bool>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub already_registered: bool,
}

impl ErrorBody {
    pub fn message(self) -> Option<String> {
        self.message.or(self.error)
    }
}
