use crate::engine::EngineHandle;
use crate::error::ApiError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use vigil_core::Verifier;

/// Largest accepted request body. Base64 photos from phone cameras easily
/// exceed axum's 2 MB default.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Process-scoped state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub verifier: Arc<Verifier>,
}

#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    pub name: String,
    pub document_number: String,
    /// Base64 photo, optionally with a `data:image/...;base64,` prefix.
    pub photo: String,
}

#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    pub status: &'static str,
    pub user_id: String,
    pub name: String,
    pub similarity: f32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/verify", post(verify))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn home() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Vigil verification API" }))
}

/// Extract live landmarks, look up the claimed identity, compare.
async fn verify(
    State(state): State<AppState>,
    payload: Result<Json<VerificationRequest>, JsonRejection>,
) -> Result<Json<VerificationResponse>, ApiError> {
    let Json(req) = payload?;
    let live = state.engine.extract(req.photo).await.map_err(|e| {
        tracing::info!(error = %e, "photo rejected");
        ApiError::from(e)
    })?;

    match state.verifier.verify(&req.name, &req.document_number, &live) {
        Ok(verified) => {
            tracing::info!(user_id = %verified.user_id, similarity = verified.similarity, "verified");
            Ok(Json(VerificationResponse {
                status: "verified",
                user_id: verified.user_id,
                name: verified.name,
                similarity: verified.similarity,
            }))
        }
        Err(e) => {
            tracing::info!(error = %e, "verification failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;
    use tower::ServiceExt;
    use vigil_core::photo::encode_base64;
    use vigil_core::{
        ExtractError, LandmarkExtractor, LandmarkFile, LandmarkSet, Point3, UserDirectory,
        SIMILARITY_THRESHOLD,
    };

    /// Stands in for the ONNX models: every photo yields the same landmarks.
    struct FixedExtractor(Option<LandmarkSet>);

    impl LandmarkExtractor for FixedExtractor {
        fn extract(&mut self, _image: &RgbImage) -> Result<Option<LandmarkSet>, ExtractError> {
            Ok(self.0.clone())
        }
    }

    fn reference() -> LandmarkSet {
        LandmarkSet {
            left_eye: vec![Point3::new(0.38, 0.42, -0.02), Point3::new(0.45, 0.43, -0.01)],
            right_eye: vec![Point3::new(0.55, 0.43, -0.01), Point3::new(0.62, 0.42, -0.02)],
            nose: vec![
                Point3::new(0.50, 0.55, -0.06),
                Point3::new(0.50, 0.58, -0.04),
                Point3::new(0.46, 0.56, -0.02),
            ],
            mouth: vec![Point3::new(0.43, 0.67, -0.01), Point3::new(0.57, 0.67, -0.01)],
        }
    }

    /// Reference landmarks mirrored through the origin: similarity -1.
    fn unrelated() -> LandmarkSet {
        let flip = |pts: &[Point3]| -> Vec<Point3> {
            pts.iter().map(|p| Point3::new(-p.x, -p.y, -p.z)).collect()
        };
        let r = reference();
        LandmarkSet {
            left_eye: flip(&r.left_eye),
            right_eye: flip(&r.right_eye),
            nose: flip(&r.nose),
            mouth: flip(&r.mouth),
        }
    }

    fn app(live: Option<LandmarkSet>) -> Router {
        let mut directory = UserDirectory::embedded().unwrap();
        let mut file = LandmarkFile::new();
        file.insert("USR001", Some(reference()));
        file.insert("USR002", None);
        directory.attach_landmarks(&file);

        router(AppState {
            engine: spawn_engine(FixedExtractor(live)).unwrap(),
            verifier: Arc::new(Verifier::new(directory, SIMILARITY_THRESHOLD)),
        })
    }

    fn selfie() -> String {
        let mut out = Cursor::new(Vec::new());
        RgbImage::new(16, 16).write_to(&mut out, ImageFormat::Png).unwrap();
        format!("data:image/png;base64,{}", encode_base64(&out.into_inner()))
    }

    /// PNG of pseudo-random pixels, which the encoder cannot shrink much.
    fn noisy_selfie(side: u32) -> String {
        let mut state = 0x2545_f491_u32;
        let image = RgbImage::from_fn(side, side, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            image::Rgb([r, g, b])
        });
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        encode_base64(&out.into_inner())
    }

    async fn post_verify(app: Router, body: Value) -> (StatusCode, Value) {
        post_raw(app, body.to_string()).await
    }

    async fn post_raw(app: Router, body: String) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/verify")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn claim(name: &str, document: &str, photo: String) -> Value {
        json!({ "name": name, "document_number": document, "photo": photo })
    }

    #[tokio::test]
    async fn test_home() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app(None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_verify_success() {
        let (status, body) = post_verify(
            app(Some(reference())),
            claim("Prasanna Patwardhan", "123456789012", selfie()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "verified");
        assert_eq!(body["user_id"], "USR001");
        assert_eq!(body["name"], "Prasanna Patwardhan");
        let similarity = body["similarity"].as_f64().unwrap();
        assert!(similarity > 0.6);
        assert!((similarity - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_verify_normalizes_claim() {
        let (status, body) = post_verify(
            app(Some(reference())),
            claim(" prasanna patwardhan ", "abcde 1234f", selfie()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "USR001");
    }

    #[tokio::test]
    async fn test_verify_unrelated_face_rejected() {
        let (status, body) = post_verify(
            app(Some(unrelated())),
            claim("Prasanna Patwardhan", "123456789012", selfie()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().starts_with("Verification rejected"));
        assert!(body["similarity"].as_f64().unwrap() <= 0.6);
        assert!((body["threshold"].as_f64().unwrap() - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_verify_wrong_document() {
        let (status, body) = post_verify(
            app(Some(reference())),
            claim("Prasanna Patwardhan", "000000000000", selfie()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("User not found"));
    }

    #[tokio::test]
    async fn test_verify_wrong_name() {
        let (status, _) = post_verify(
            app(Some(reference())),
            claim("Yash Kulkarni", "123456789012", selfie()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_verify_invalid_photo() {
        let (status, body) = post_verify(
            app(Some(reference())),
            claim("Prasanna Patwardhan", "123456789012", "not a photo!".into()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().starts_with("Failed to process photo"));
    }

    #[tokio::test]
    async fn test_verify_base64_but_not_image() {
        let (status, body) = post_verify(
            app(Some(reference())),
            claim("Prasanna Patwardhan", "123456789012", encode_base64(b"plain text")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().starts_with("Failed to process photo"));
    }

    #[tokio::test]
    async fn test_verify_no_face() {
        let (status, body) = post_verify(
            app(None),
            claim("Prasanna Patwardhan", "123456789012", selfie()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "No face detected in the provided photo.");
    }

    #[tokio::test]
    async fn test_verify_missing_stored_landmarks() {
        let (status, body) = post_verify(
            app(Some(reference())),
            claim("Yash Kulkarni", "987654321098", selfie()),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("USR002"));
    }

    #[tokio::test]
    async fn test_verify_accepts_photo_over_default_body_limit() {
        let photo = noisy_selfie(1200);
        assert!(photo.len() > 2 * 1024 * 1024);
        assert!(photo.len() < MAX_BODY_BYTES);
        let (status, body) = post_verify(
            app(Some(reference())),
            claim("Prasanna Patwardhan", "123456789012", photo),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "USR001");
    }

    #[tokio::test]
    async fn test_verify_missing_field_is_json_error() {
        let (status, body) = post_verify(
            app(Some(reference())),
            json!({ "name": "Prasanna Patwardhan", "document_number": "123456789012" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("photo"));
    }

    #[tokio::test]
    async fn test_verify_malformed_json_is_json_error() {
        let (status, body) = post_raw(app(Some(reference())), "{\"name\": ".into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
    }
}
