//! Push webhooks
//!
//! A push to a study repository triggers a pull and a full re-import in the
//! background. With a secret configured, the payload must carry a valid
//! `X-Hub-Signature-256: sha256=<hex>` HMAC of the raw body.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use ddi_import::study_admin::StudyImport;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{error, info, warn};

use super::study_by_name;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

type HmacSha256 = Hmac<Sha256>;

/// Header value for `body` signed with `secret`
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a `sha256=<hex>` signature
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// POST /webhooks/:study
pub async fn push(
    State(state): State<AppState>,
    Path(study): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", SIGNATURE_HEADER)))?;
        if !verify_signature(secret, &body, signature) {
            warn!(study = %study, "Webhook signature mismatch");
            return Err(ApiError::Unauthorized("signature mismatch".to_string()));
        }
    }

    let study = study_by_name(&state, &study).await?;
    info!(study = %study.name, "Push received, scheduling update");

    let admin = state.admin.clone();
    let name = study.name.clone();
    tokio::spawn(async move {
        match admin.update(&name, &[], None, false).await {
            Ok(StudyImport::Run(run)) => {
                info!(study = %name, run = %run.id, state = run.state.as_str(), "Webhook import finished")
            }
            Ok(StudyImport::Entities(_)) => info!(study = %name, "Webhook import finished"),
            Err(e) => error!(study = %name, error = %e, "Webhook import failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "study": study.name })),
    ))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/:study", post(push))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let signature = sign("s3cret", b"{\"ref\":\"refs/heads/master\"}");
        assert!(signature.starts_with("sha256="));
        assert!(verify_signature("s3cret", b"{\"ref\":\"refs/heads/master\"}", &signature));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let signature = sign("s3cret", b"payload");
        assert!(!verify_signature("s3cret", b"payload!", &signature));
        assert!(!verify_signature("other", b"payload", &signature));
        assert!(!verify_signature("s3cret", b"payload", "sha1=abcd"));
        assert!(!verify_signature("s3cret", b"payload", "sha256=not-hex"));
    }
}
