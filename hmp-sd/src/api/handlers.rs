//! Service endpoints (health, build identification)

use axum::response::Json;
use serde::Serialize;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct BuildInfoResponse {
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Liveness check polled by the player
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "hmp-sd".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Build Information
// ============================================================================

/// GET /build_info - Identification stamped by build.rs
pub async fn build_info() -> Json<BuildInfoResponse> {
    Json(BuildInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("HMP_GIT_HASH").to_string(),
        build_timestamp: env!("HMP_BUILD_TIMESTAMP").to_string(),
        build_profile: env!("HMP_BUILD_PROFILE").to_string(),
    })
}
