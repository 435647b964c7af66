//! attend-api — Client for the attendance backend.
//!
//! Wraps the employee verification, face registration, check-in/out,
//! history and geofence validation endpoints, and keeps the signed-in
//! session in the injected key–value store.

pub mod client;
pub mod session;
pub mod types;

pub use client::{ApiClient, ApiConfig, ApiError};
pub use session::{Session, SessionStore};
pub use types::{
    AttendanceRecord, AttendanceResponse, Employee, HistoryResponse, RegisterFaceResponse,
    VerifyIdResponse,
};
