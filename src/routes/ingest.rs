use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::AppError,
    models::{ConnectionCredentials, IngestionResult},
    services::{
        connection,
        readers::{FileKind, UploadedFile},
        IngestionRun,
    },
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/connections/test", post(test_connection))
        .route("/ingest", post(ingest_file))
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    reachable: bool,
}

async fn test_connection(
    Json(credentials): Json<ConnectionCredentials>,
) -> Result<Json<ConnectionStatus>, AppError> {
    let reachable =
        tokio::task::spawn_blocking(move || connection::test_connection(&credentials)).await?;
    Ok(Json(ConnectionStatus { reachable }))
}

/// A validated `/ingest` form.
#[derive(Debug)]
pub struct IngestRequest {
    pub credentials: ConnectionCredentials,
    pub table_name: String,
    pub file: UploadedFile,
}

impl IngestRequest {
    pub fn from_parts(
        mut fields: HashMap<String, String>,
        file: Option<(String, Bytes)>,
    ) -> Result<Self, AppError> {
        let (file_name, data) = file
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| AppError::InvalidInput("No file selected".to_string()))?;

        if FileKind::from_filename(&file_name).is_none() {
            return Err(AppError::UnsupportedFileType(file_name));
        }

        let mut required = |key: &str| {
            fields
                .remove(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::InvalidInput(format!("Missing field: {}", key)))
        };
        let table_name = required("table_name")?;
        let database = required("database")?;

        let credentials = ConnectionCredentials {
            host: fields.remove("host").unwrap_or_default(),
            user: fields.remove("user").unwrap_or_default(),
            password: fields.remove("password").unwrap_or_default(),
            database,
        };
        let sheet = fields.remove("sheet").filter(|s| !s.is_empty());

        Ok(Self {
            credentials,
            table_name,
            file: UploadedFile { file_name, data, sheet },
        })
    }
}

async fn read_form(mut multipart: Multipart) -> Result<IngestRequest, AppError> {
    let mut fields = HashMap::new();
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await?;
            file = Some((file_name, data));
        } else {
            let value = field.text().await?;
            fields.insert(name, value);
        }
    }

    IngestRequest::from_parts(fields, file)
}

async fn ingest_file(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<IngestionResponse, AppError> {
    let request = read_form(multipart).await?;
    tracing::info!(
        "Ingest request: file {}, {}KB, table {}",
        request.file.file_name,
        request.file.data.len() / 1024,
        request.table_name
    );

    let timeout = state.config.ingest_timeout;
    let result = tokio::task::spawn_blocking(move || {
        let run = IngestionRun::new(request.file, request.credentials, request.table_name);
        match timeout {
            Some(timeout) => run.with_timeout(timeout).run(),
            None => run.run(),
        }
    })
    .await?;

    Ok(IngestionResponse(result))
}

pub struct IngestionResponse(pub IngestionResult);

impl IntoResponse for IngestionResponse {
    fn into_response(self) -> Response {
        let status = self
            .0
            .error_kind()
            .map_or(StatusCode::OK, |kind| kind.status_code());
        (status, Json(self.0)).into_response()
    }
}
