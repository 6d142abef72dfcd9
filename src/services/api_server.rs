// src/services/api_server.rs
//! API Server for the academic credential backend
//!
//! The API is built using Axum and includes endpoints for:
//! - SAP id verification, plus the HTML verification form
//! - Credential issuance and the issuance logs
//! - Signed credential verification and DID resolution
//!
//! Every JSON response carries a boolean `success`; errors are shaped by
//! [`ApiError`].

use crate::config::Settings;
use crate::identity::agent::IdentityAgent;
use crate::identity::AgentError;
use crate::models::credential::{ProofFormat, VerifiableCredential};
use crate::services::credential_issuer::{CredentialIssuer, StudentDetails};
use crate::services::error::ApiError;
use crate::services::verifier::Verifier;
use crate::storage::meta_store::MetaStore;
use crate::utils::now_rfc3339;
use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    response::Html,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// The verification form served at `GET /verify`.
const VERIFY_PAGE: &str = include_str!("verify_page.html");

type ApiResult = Result<Json<Value>, ApiError>;

/// Reads a request field as text; numbers are accepted, blanks are not.
fn text_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn student_details(body: &Value) -> Option<StudentDetails> {
    let (name, sap, email) = (
        text_field(body, "name"),
        text_field(body, "sap"),
        text_field(body, "email"),
    );
    StudentDetails::from_fields(name.as_deref(), sap.as_deref(), email.as_deref())
}

/// API server state containing all service dependencies
pub struct ApiServer {
    /// Service for issuing credentials and keeping the issuance logs
    credential_issuer: CredentialIssuer,

    /// Service for SAP lookups and credential verification
    verifier: Verifier,

    /// Identity agent, for identifier listing and DID resolution
    agent: Arc<dyn IdentityAgent>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `settings` - Locations of the JSON stores
    /// * `agent` - Identity agent shared by issuer and verifier
    pub fn new(settings: &Settings, agent: Arc<dyn IdentityAgent>) -> Self {
        ApiServer {
            credential_issuer: CredentialIssuer::new(
                agent.clone(),
                settings.verified_users_path(),
                settings.database_path(),
            ),
            verifier: Verifier::new(MetaStore::new(settings.meta_path()), agent.clone()),
            agent,
        }
    }

    /// Builds the router with permissive CORS.
    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(Self::root_handler))
            .route("/health", get(Self::health_handler))
            .route("/verify", get(Self::verify_page_handler).post(Self::verify_handler))
            .route("/users", get(Self::users_handler))
            .route("/issue-credential", post(Self::issue_credential_handler))
            .route("/verified-users", get(Self::verified_users_handler))
            .route("/issue-user", post(Self::issue_user_handler))
            .route("/verify-credential", post(Self::verify_credential_handler))
            .route("/resolve-did/:did", get(Self::resolve_did_handler))
            .route("/identifiers", get(Self::identifiers_handler))
            .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
            .with_state(Arc::new(self))
    }

    /// Starts the API server and serves until the process is stopped
    ///
    /// # Arguments
    /// * `addr` - Address to bind to (e.g., "0.0.0.0:5000")
    pub async fn run(self, addr: &str) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("backend listening on http://{}", listener.local_addr()?);
        axum::serve(listener, self.router()).await
    }

    /// # Endpoint
    /// GET /
    async fn root_handler() -> &'static str {
        "Backend running"
    }

    /// # Endpoint
    /// GET /health
    async fn health_handler() -> Json<Value> {
        Json(json!({ "status": "ok", "timestamp": now_rfc3339() }))
    }

    /// # Endpoint
    /// GET /verify
    async fn verify_page_handler() -> Html<&'static str> {
        Html(VERIFY_PAGE)
    }

    /// Verifies a student by SAP id
    ///
    /// # Endpoint
    /// POST /verify
    ///
    /// # Request Body
    /// `{ "sap": "500012" }`
    ///
    /// # Responses
    /// - 200 OK: `success: true` with the certificate, or `success: false`
    ///   if the SAP id is unknown
    /// - 400 Bad Request: SAP id missing
    /// - 500 Internal Server Error: meta file unreadable
    async fn verify_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<Value>, JsonRejection>,
    ) -> ApiResult {
        let sap = payload
            .ok()
            .and_then(|Json(body)| text_field(&body, "sap"))
            .ok_or_else(|| ApiError::bad_request("SAP ID missing"))?;

        match state.verifier.verify_sap(&sap).await {
            Ok(Some(student)) => Ok(Json(json!({
                "success": true,
                "message": "Certificate Verified Successfully",
                "data": student,
            }))),
            Ok(None) => Ok(Json(json!({
                "success": false,
                "message": "No certificate found for this SAP ID",
            }))),
            Err(e) => Err(ApiError::internal("Server error during verification", e)),
        }
    }

    /// # Endpoint
    /// GET /users
    async fn users_handler(State(state): State<Arc<ApiServer>>) -> ApiResult {
        let users = state
            .verifier
            .users_document()
            .await
            .map_err(|e| ApiError::internal("Failed to read users", e))?;
        Ok(Json(json!({ "success": true, "users": users })))
    }

    /// Issues a `StudentID` credential
    ///
    /// # Endpoint
    /// POST /issue-credential
    ///
    /// # Request Body
    /// `{ "name": ..., "sap": ..., "email": ... }`
    ///
    /// # Responses
    /// - 200 OK: `{ success: true, credential }`
    /// - 400 Bad Request: a field is missing
    /// - 500 Internal Server Error: signing or logging failed
    async fn issue_credential_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<Value>, JsonRejection>,
    ) -> ApiResult {
        let student = payload
            .ok()
            .and_then(|Json(body)| student_details(&body))
            .ok_or_else(|| ApiError::bad_request("Missing required fields: name, sap, email"))?;

        let credential = state
            .credential_issuer
            .issue_student_id(&student)
            .await
            .map_err(|e| ApiError::internal("Credential issuance failed", e))?;
        Ok(Json(json!({ "success": true, "credential": credential.into_value() })))
    }

    /// # Endpoint
    /// GET /verified-users
    async fn verified_users_handler(State(state): State<Arc<ApiServer>>) -> ApiResult {
        let entries = state
            .credential_issuer
            .verified_users()
            .await
            .map_err(|e| ApiError::internal("Failed to read verified users", e))?;
        Ok(Json(Value::Array(entries)))
    }

    /// Records a student in the issued-users log
    ///
    /// # Endpoint
    /// POST /issue-user
    ///
    /// # Responses
    /// - 200 OK: recorded
    /// - 400 Bad Request: a field is missing
    async fn issue_user_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<Value>, JsonRejection>,
    ) -> ApiResult {
        let student = payload
            .ok()
            .and_then(|Json(body)| student_details(&body))
            .ok_or_else(|| ApiError::bad_request("All fields required"))?;

        state
            .credential_issuer
            .record_issued_user(&student)
            .await
            .map_err(|e| ApiError::internal("Failed to record user", e))?;
        Ok(Json(json!({ "success": true, "message": "Credential issued successfully" })))
    }

    /// Verifies a signed credential, probing both proof formats
    ///
    /// # Endpoint
    /// POST /verify-credential
    ///
    /// # Request Body
    /// `{ "credential": <object or JWT string>, "proofFormat"?: "jwt" | "lds" }`
    ///
    /// # Responses
    /// - 200 OK: `{ success: true, verified, triedFormats, result }`
    /// - 400 Bad Request: credential missing or unknown proof format
    async fn verify_credential_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<Value>, JsonRejection>,
    ) -> ApiResult {
        let Json(mut body) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
        let credential = match body.get_mut("credential").map(Value::take) {
            Some(Value::Null) | None => return Err(ApiError::bad_request("credential missing")),
            Some(credential) => VerifiableCredential(credential),
        };
        let preferred = match body.get("proofFormat").and_then(Value::as_str) {
            Some(format) => Some(format.parse::<ProofFormat>().map_err(ApiError::BadRequest)?),
            None => None,
        };

        let outcome = state.verifier.verify_credential(&credential, preferred).await;
        Ok(Json(json!({
            "success": true,
            "verified": outcome.verified,
            "triedFormats": outcome.tried_formats,
            "result": outcome.result,
        })))
    }

    /// Resolves a DID to its document
    ///
    /// # Endpoint
    /// GET /resolve-did/:did
    ///
    /// # Responses
    /// - 200 OK: DID document
    /// - 404 Not Found: the DID cannot be resolved
    async fn resolve_did_handler(
        Path(did): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> ApiResult {
        match state.agent.resolve_did(&did).await {
            Ok(document) => Ok(Json(json!(document))),
            Err(AgentError::InvalidDid(reason)) => {
                Err(ApiError::NotFound(format!("DID could not be resolved: {}", reason)))
            }
            Err(e) => Err(ApiError::internal("DID resolution failed", e)),
        }
    }

    /// # Endpoint
    /// GET /identifiers
    async fn identifiers_handler(State(state): State<Arc<ApiServer>>) -> ApiResult {
        let identifiers = state
            .agent
            .find_identifiers()
            .await
            .map_err(|e| ApiError::internal("Failed to list identifiers", e))?;
        Ok(Json(json!({ "success": true, "identifiers": identifiers })))
    }
}
