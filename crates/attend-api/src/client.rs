//! HTTP client for the attendance backend.

use crate::types::{
    AttendanceResponse, CheckInRequest, CheckOutRequest, ErrorBody, HistoryResponse,
    RegisterFaceRequest, RegisterFaceResponse, ValidateLocationRequest, VerifyIdRequest,
    VerifyIdResponse,
};
use async_trait::async_trait;
use attend_core::{RemoteGeofence, RemoteValidation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("backend error ({status}): {message}")]
    Backend {
        status: u16,
        message: String,
        already_registered: bool,
    },
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Message suitable for showing to the employee.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(e) if e.is_timeout() => {
                "The attendance server took too long to respond. Please try again.".into()
            }
            ApiError::Network(_) => {
                "Unable to reach the attendance server. Check your connection and try again."
                    .into()
            }
            ApiError::Backend {
                already_registered: true,
                ..
            } => "This employee ID already has a registered face.".into(),
            ApiError::Backend { message, .. } => message.clone(),
            ApiError::Decode(_) => "The attendance server sent an unexpected response.".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Backend origin, e.g. `https://attendance.example.com` (no trailing `/api`).
    pub base_url: String,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Clone-safe handle; clones share the underlying connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Attach a bearer token to every subsequent request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        tracing::debug!(path, "POST");
        let req = self.authorize(self.http.post(self.url(path)).json(body));
        let resp = req.send().await?;
        decode(resp).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        tracing::debug!(path, "GET");
        let req = self.authorize(self.http.get(self.url(path)).query(query));
        let resp = req.send().await?;
        decode(resp).await
    }

    /// `POST /api/employees/verify-id`
    pub async fn verify_employee_id(
        &self,
        employee_id: &str,
    ) -> Result<VerifyIdResponse, ApiError> {
        self.post("/api/employees/verify-id", &VerifyIdRequest { employee_id })
            .await
    }

    /// `POST /api/location/validate`
    pub async fn validate_location(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<RemoteValidation, ApiError> {
        self.post(
            "/api/location/validate",
            &ValidateLocationRequest {
                latitude,
                longitude,
            },
        )
        .await
    }

    /// `POST /api/face/register`
    pub async fn register_face(
        &self,
        employee_id: &str,
        image_base64: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<RegisterFaceResponse, ApiError> {
        self.post(
            "/api/face/register",
            &RegisterFaceRequest {
                employee_id,
                image_base64,
                latitude,
                longitude,
            },
        )
        .await
    }

    /// `POST /api/attendance/check-in`
    pub async fn check_in(
        &self,
        image_base64: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<AttendanceResponse, ApiError> {
        self.post(
            "/api/attendance/check-in",
            &CheckInRequest {
                image_base64,
                latitude,
                longitude,
            },
        )
        .await
    }

    /// `POST /api/attendance/check-out`
    pub async fn check_out(&self, image_base64: &str) -> Result<AttendanceResponse, ApiError> {
        self.post("/api/attendance/check-out", &CheckOutRequest { image_base64 })
            .await
    }

    /// `GET /api/attendance/{employeeId}?limit=N`
    pub async fn attendance_history(
        &self,
        employee_id: &str,
        limit: u32,
    ) -> Result<HistoryResponse, ApiError> {
        let path = format!("/api/attendance/{}", urlencoding::encode(employee_id));
        self.get(&path, &[("limit", limit.to_string())]).await
    }
}

/// Map a response to `T`, turning non-2xx statuses and `success: false`
/// bodies into [`ApiError::Backend`].
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();

    if !status.is_success() || body.success == Some(false) {
        let already_registered = body.already_registered;
        let message = body
            .message()
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));
        tracing::warn!(status = status.as_u16(), %message, "backend rejected request");
        return Err(ApiError::Backend {
            status: status.as_u16(),
            message,
            already_registered,
        });
    }

    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl RemoteGeofence for ApiClient {
    type Error = ApiError;

    async fn validate(&self, latitude: f64, longitude: f64) -> Result<RemoteValidation, ApiError> {
        self.validate_location(latitude, longitude).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve a single canned response; the handle yields the raw request text.
    async fn serve_once(status: u16, body: &str) -> (ApiClient, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let header_end = loop {
                let n = sock.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
            let content_length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            while buf.len() < header_end + content_length {
                let n = sock.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status} OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        });

        let client = ApiClient::new(&ApiConfig::new(base)).unwrap();
        (client, handle)
    }

    #[tokio::test]
    async fn test_verify_employee_id() {
        let (client, server) = serve_once(
            200,
            r#"{"success":true,"employee":{"employeeId":"E42","name":"Sam Doe","faceRegistered":false},"token":"t0k"}"#,
        )
        .await;

        let resp = client.verify_employee_id("E42").await.unwrap();
        assert_eq!(resp.employee.employee_id, "E42");
        assert_eq!(resp.token.as_deref(), Some("t0k"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/employees/verify-id HTTP/1.1"));
        assert!(request.contains(r#"{"employeeId":"E42"}"#));
    }

    #[tokio::test]
    async fn test_already_registered_error() {
        let (client, _server) = serve_once(
            409,
            r#"{"success":false,"message":"Face already registered","alreadyRegistered":true}"#,
        )
        .await;

        let err = client.verify_employee_id("E42").await.unwrap_err();
        match &err {
            ApiError::Backend {
                status,
                already_registered,
                message,
            } => {
                assert_eq!(*status, 409);
                assert!(*already_registered);
                assert_eq!(message, "Face already registered");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.user_message().contains("already"));
    }

    #[tokio::test]
    async fn test_success_false_with_200_is_backend_error() {
        let (client, _server) =
            serve_once(200, r#"{"success":false,"error":"Face not recognized"}"#).await;

        let err = client.check_out("aGk=").await.unwrap_err();
        assert_eq!(err.user_message(), "Face not recognized");
    }

    #[tokio::test]
    async fn test_check_in_sends_image_and_position_with_token() {
        let (client, server) =
            serve_once(200, r#"{"success":true,"message":"Checked in at 09:01"}"#).await;
        let client = client.with_token(Some("abc".into()));

        let resp = client.check_in("aGk=", 12.5, 77.25).await.unwrap();
        assert_eq!(resp.message, "Checked in at 09:01");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/attendance/check-in HTTP/1.1"));
        assert!(request.to_lowercase().contains("authorization: bearer abc"));
        assert!(request.contains(r#""imageBase64":"aGk=""#));
        assert!(request.contains(r#""latitude":12.5"#));
    }

    #[tokio::test]
    async fn test_history_query_and_parse() {
        let (client, server) = serve_once(
            200,
            r#"{"success":true,"history":[
                {"date":"2026-10-15","checkInTime":"09:00","checkOutTime":null,"status":"present","attendanceId":17},
                {"date":"2026-10-14","checkInTime":"09:10","checkOutTime":"17:30","status":"present","attendanceId":"a-16"}
            ]}"#,
        )
        .await;

        let resp = client.attendance_history("E 42", 7).await.unwrap();
        assert_eq!(resp.history.len(), 2);
        assert_eq!(resp.history[0].attendance_id.as_deref(), Some("17"));
        assert!(resp.history[0].check_out_time.is_none());
        assert_eq!(resp.history[1].attendance_id.as_deref(), Some("a-16"));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/attendance/E%2042?limit=7 HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_remote_geofence_impl() {
        let (client, _server) = serve_once(
            200,
            r#"{"withinRange":true,"distance":12.2,"allowedRadius":150,"isConfigured":true,"officeLocation":{"lat":1.0,"lng":2.0}}"#,
        )
        .await;

        let v = RemoteGeofence::validate(&client, 1.0, 2.0001).await.unwrap();
        assert!(v.within_range);
        assert_eq!(v.allowed_radius, 150.0);
        assert!(v.geofence().is_some());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = ApiClient::new(&ApiConfig::new(base)).unwrap();
        let err = client.validate_location(0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert!(err.user_message().contains("Unable to reach"));
    }
}
