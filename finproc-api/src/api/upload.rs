//! Multipart request parsing
//!
//! File parts become ordered uploads; every other part is kept as a text
//! field (`mode`, `sheetName`, `role.<name>` hints).

use axum::extract::Multipart;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::jobs::{JobRequest, Upload, UploadSet};

/// Read the whole multipart body into a job request
pub async fn read_job_request(mut multipart: Multipart) -> ApiResult<JobRequest> {
    let mut uploads = Vec::new();
    let mut fields = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e.body_text())))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read {}: {}", file_name, e.body_text()))
                })?;
                debug!(field = %name, file = %file_name, bytes = bytes.len(), "Received upload");
                uploads.push(Upload::new(file_name, bytes));
            }
            None => {
                let value = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read field {}: {}", name, e.body_text()))
                })?;
                fields.insert(name, value);
            }
        }
    }

    Ok(JobRequest {
        uploads: UploadSet::new(uploads),
        fields,
    })
}
