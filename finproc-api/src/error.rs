//! Error types for finproc-api

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::jobs::contract::ContractError;
use crate::jobs::JobError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Uploads do not satisfy the job contract (400)
    #[error("Upload does not match the job: {0}")]
    UploadContract(ContractError),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Staging failed (500)
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Interpreter or script could not be started (500)
    #[error("{0}")]
    ComputationSpawn(String),

    /// Computation exited abnormally or produced nothing (500)
    #[error("{0}")]
    ComputationFailed(String),

    /// Computation exceeded the configured timeout (504)
    #[error("{0}")]
    ComputationTimeout(String),

    /// Computation refused every input (400)
    #[error("{0}")]
    InputRejected(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UploadContract(_) | ApiError::BadRequest(_) | ApiError::InputRejected(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ComputationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Workspace(_)
            | ApiError::ComputationSpawn(_)
            | ApiError::ComputationFailed(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::UploadContract(_) => "UPLOAD_CONTRACT",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Workspace(_) => "WORKSPACE_ERROR",
            ApiError::ComputationSpawn(_) => "COMPUTATION_SPAWN",
            ApiError::ComputationFailed(_) => "COMPUTATION_FAILED",
            ApiError::ComputationTimeout(_) => "COMPUTATION_TIMEOUT",
            ApiError::InputRejected(_) => "INPUT_REJECTED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the client
    fn client_message(&self) -> String {
        match self {
            ApiError::UploadContract(e) => e.to_string(),
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Workspace(m)
            | ApiError::ComputationSpawn(m)
            | ApiError::ComputationFailed(m)
            | ApiError::ComputationTimeout(m)
            | ApiError::InputRejected(m)
            | ApiError::Internal(m) => m.clone(),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::UnknownJob(_) | JobError::NoSheetListing(_) => {
                ApiError::NotFound(err.to_string())
            }
            JobError::InvalidMode { .. } | JobError::MissingParameter(_) => {
                ApiError::BadRequest(err.to_string())
            }
            JobError::Contract(e) => ApiError::UploadContract(e),
            JobError::Workspace(e) => ApiError::Workspace(e.to_string()),
            JobError::Sheets(e) => ApiError::Internal(e.to_string()),
            JobError::ComputationSpawn(m) => ApiError::ComputationSpawn(m),
            JobError::ComputationFailed(m) => ApiError::ComputationFailed(m),
            JobError::ComputationTimeout(m) => ApiError::ComputationTimeout(m),
            JobError::InputRejected(m) => ApiError::InputRejected(m),
            JobError::Internal(m) => ApiError::Internal(m),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut error = json!({
            "code": self.code(),
            "message": self.client_message(),
        });

        if let ApiError::UploadContract(ref contract) = self {
            if let (Value::Object(map), Ok(Value::Object(details))) =
                (&mut error, serde_json::to_value(contract))
            {
                map.extend(details);
            }
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::contract::CountMismatch;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_contract_error_body_lists_violations() {
        let mut contract = ContractError::default();
        contract.count_mismatches.push(CountMismatch {
            role: None,
            expected: "exactly 2".to_string(),
            actual: 3,
        });

        let response = ApiError::UploadContract(contract).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UPLOAD_CONTRACT");
        assert_eq!(body["error"]["message"], "expected exactly 2 file(s), got 3");
        assert_eq!(body["error"]["count_mismatches"][0]["actual"], 3);
        assert_eq!(body["error"]["missing_roles"], json!([]));
    }

    #[tokio::test]
    async fn test_timeout_is_gateway_timeout() {
        let response = ApiError::from(JobError::ComputationTimeout("slow".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "COMPUTATION_TIMEOUT");
        assert_eq!(body["error"]["message"], "slow");
    }

    #[test]
    fn test_job_error_mapping() {
        assert_eq!(
            ApiError::from(JobError::UnknownJob("x".to_string())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(JobError::MissingParameter("sheetName")).code(),
            "BAD_REQUEST"
        );
        assert_eq!(
            ApiError::from(JobError::InputRejected("none".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(JobError::ComputationSpawn("no python".to_string())).code(),
            "COMPUTATION_SPAWN"
        );
    }
}
