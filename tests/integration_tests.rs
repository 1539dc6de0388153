//! Integration tests for cane-detect: analysis properties and the HTTP API.

use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{bail, Result};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use image::{DynamicImage, ImageFormat, RgbImage};
use serde_json::Value;
use tower::ServiceExt;

use cane_detect::analysis::{analyze, recommendations, Status};
use cane_detect::pipeline::{process_image, select_model, InferenceBackend, InferenceOutput};
use cane_detect::server::{create_router, AppState};
use cane_detect::types::{BBox, ClassNames, Detection, ModelKind};

fn names() -> ClassNames {
    ["disease", "healthy", "insect"].into_iter().collect()
}

fn det(class_id: u32, confidence: f32) -> Detection {
    Detection::new(
        class_id,
        confidence,
        BBox {
            x1: 1.0,
            y1: 1.0,
            x2: 6.0,
            y2: 6.0,
        },
    )
}

/// Backend that returns canned detections without running a model
struct StubBackend {
    detections: Vec<Detection>,
    segmentation_loaded: bool,
}

impl InferenceBackend for StubBackend {
    fn models_available(&self) -> Vec<ModelKind> {
        let mut kinds = vec![ModelKind::Detection];
        if self.segmentation_loaded {
            kinds.push(ModelKind::Segmentation);
        }
        kinds
    }

    fn model_path(&self, kind: ModelKind) -> Option<PathBuf> {
        match kind {
            ModelKind::Detection => Some(PathBuf::from("models/yolov8.onnx")),
            ModelKind::Segmentation if self.segmentation_loaded => {
                Some(PathBuf::from("models/yolov8_seg.onnx"))
            }
            ModelKind::Segmentation => None,
        }
    }

    fn run_inference(
        &self,
        image: &DynamicImage,
        requested: ModelKind,
        confidence: f32,
    ) -> Result<InferenceOutput> {
        let model_type = select_model(requested, true, self.segmentation_loaded)?;
        Ok(InferenceOutput {
            rendered: image.clone(),
            detections: self
                .detections
                .iter()
                .filter(|d| d.confidence > confidence)
                .cloned()
                .collect(),
            class_names: names(),
            model_type,
        })
    }
}

struct FailingBackend;

impl InferenceBackend for FailingBackend {
    fn models_available(&self) -> Vec<ModelKind> {
        Vec::new()
    }

    fn model_path(&self, _kind: ModelKind) -> Option<PathBuf> {
        None
    }

    fn run_inference(&self, _: &DynamicImage, _: ModelKind, _: f32) -> Result<InferenceOutput> {
        bail!("No models available. Please check model files.")
    }
}

/// Backend whose inference blocks until the test releases it
struct BusyBackend {
    started: parking_lot::Mutex<mpsc::Sender<()>>,
    release: parking_lot::Mutex<mpsc::Receiver<()>>,
}

impl InferenceBackend for BusyBackend {
    fn models_available(&self) -> Vec<ModelKind> {
        vec![ModelKind::Detection]
    }

    fn model_path(&self, kind: ModelKind) -> Option<PathBuf> {
        (kind == ModelKind::Detection).then(|| PathBuf::from("models/yolov8.onnx"))
    }

    fn run_inference(&self, _: &DynamicImage, _: ModelKind, _: f32) -> Result<InferenceOutput> {
        let _ = self.started.lock().send(());
        let _ = self.release.lock().recv();
        bail!("released")
    }
}

fn router(backend: Arc<dyn InferenceBackend>) -> axum::Router {
    let state = AppState {
        backend,
        default_confidence: 0.25,
    };
    create_router(state, None, 1024 * 1024)
}

fn stub_router() -> axum::Router {
    router(Arc::new(StubBackend {
        detections: vec![det(0, 0.9), det(0, 0.7), det(2, 0.5)],
        segmentation_loaded: false,
    }))
}

fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
    let mut out = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

const BOUNDARY: &str = "cane-detect-test-boundary";

enum Part<'a> {
    File { filename: &'a str, data: &'a [u8] },
    Text { name: &'a str, value: &'a str },
}

fn multipart_request(parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File { filename, data } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}",
                        name, value
                    )
                    .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(router: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ---- analysis properties ----

#[test]
fn test_counts_sum_to_input_length() {
    let detections = vec![det(0, 0.9), det(1, 0.4), det(2, 0.5), det(0, 0.3), det(7, 0.8)];
    let result = analyze(&detections, &names(), ModelKind::Detection);
    let total: usize = result.detections.iter().map(|g| g.count).sum();
    assert_eq!(total, detections.len());
    assert_eq!(result.total_detections, detections.len());
}

#[test]
fn test_critical_iff_high_tier_present() {
    let with_disease = analyze(&[det(1, 0.9), det(0, 0.4)], &names(), ModelKind::Detection);
    assert_eq!(with_disease.status, Status::Critical);

    let without = analyze(&[det(1, 0.9), det(2, 0.4)], &names(), ModelKind::Detection);
    assert_eq!(without.status, Status::Warning);
}

#[test]
fn test_empty_input_is_healthy() {
    let result = analyze(&[], &names(), ModelKind::Segmentation);
    assert_eq!(result.status, Status::Healthy);
    assert_eq!(result.total_detections, 0);
    assert!(result.detections.is_empty());
    assert_eq!(result.recommendations.len(), 3);
    assert_eq!(result.recommendations, recommendations::MAINTENANCE.to_vec());
}

#[test]
fn test_disease_and_insect_example() {
    let result = analyze(
        &[det(0, 0.9), det(0, 0.7), det(2, 0.5)],
        &names(),
        ModelKind::Detection,
    );
    assert_eq!(result.status, Status::Critical);
    assert_eq!(result.detections.len(), 2);

    let disease = &result.detections[0];
    assert_eq!(disease.class_name, "disease");
    assert_eq!(disease.count, 2);
    assert!((disease.mean_confidence - 0.8).abs() < 1e-6);

    let insect = &result.detections[1];
    assert_eq!(insect.class_name, "insect");
    assert_eq!(insect.count, 1);
    assert!((insect.mean_confidence - 0.5).abs() < 1e-6);

    assert_eq!(result.recommendations.len(), 7);
    assert_eq!(
        &result.recommendations[..4],
        &recommendations::DISEASE_RESPONSE[..]
    );
    assert_eq!(
        &result.recommendations[4..],
        &recommendations::PEST_RESPONSE[..]
    );
}

#[test]
fn test_unknown_class_uses_fallback() {
    let custom: ClassNames = ["unknown_class"].into_iter().collect();
    let result = analyze(&[det(0, 0.6)], &custom, ModelKind::Detection);
    assert_eq!(result.status, Status::Healthy);
    let group = &result.detections[0];
    assert_eq!(group.color, "#6b7280");
    assert_eq!(group.icon, "•");
    assert_eq!(result.recommendations.len(), 2);
    assert_eq!(
        result.recommendations,
        recommendations::GENERIC_MONITORING.to_vec()
    );
}

#[test]
fn test_mean_confidence_is_arithmetic_mean() {
    let confidences = [0.31f32, 0.47, 0.88, 0.52];
    let detections: Vec<_> = confidences.iter().map(|&c| det(2, c)).collect();
    let result = analyze(&detections, &names(), ModelKind::Detection);
    let expected = confidences.iter().map(|&c| c as f64).sum::<f64>() / confidences.len() as f64;
    assert!((result.detections[0].mean_confidence - expected).abs() < 1e-6);
}

#[test]
fn test_process_image_packages_png() {
    let backend = StubBackend {
        detections: vec![det(2, 0.5)],
        segmentation_loaded: true,
    };
    let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
    let response = process_image(&backend, &image, ModelKind::Segmentation, 0.25).unwrap();
    assert!(response.success);
    assert!(response.image.starts_with("data:image/png;base64,"));
    assert_eq!(response.analysis.model_type, ModelKind::Segmentation);
    assert_eq!(response.analysis.status, Status::Warning);
}

// ---- HTTP API ----

#[tokio::test]
async fn test_health_endpoint() {
    let request = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(stub_router(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["models_available"], serde_json::json!(["detection"]));
    assert_eq!(body["detection_model"], "models/yolov8.onnx");
    assert_eq!(body["segmentation_model"], "Not loaded");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health_answers_during_inference() {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let app = router(Arc::new(BusyBackend {
        started: parking_lot::Mutex::new(started_tx),
        release: parking_lot::Mutex::new(release_rx),
    }));

    let png = png_bytes();
    let upload = multipart_request(&[Part::File {
        filename: "leaf.png",
        data: &png,
    }]);
    let analyze = tokio::spawn(send(app.clone(), upload));
    tokio::task::spawn_blocking(move || started_rx.recv())
        .await
        .unwrap()
        .unwrap();

    let health = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = tokio::time::timeout(Duration::from_secs(5), send(app, health))
        .await
        .expect("health blocked behind inference");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detection_model"], "models/yolov8.onnx");

    release_tx.send(()).unwrap();
    let (status, body) = analyze.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_analyze_success() {
    let png = png_bytes();
    let request = multipart_request(&[
        Part::File {
            filename: "leaf.png",
            data: &png,
        },
        Part::Text {
            name: "model_type",
            value: "segmentation",
        },
        Part::Text {
            name: "conf_threshold",
            value: "0.25",
        },
    ]);
    let (status, body) = send(stub_router(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let analysis = &body["analysis"];
    assert_eq!(analysis["total_detections"], 3);
    assert_eq!(analysis["status"], "critical");
    // segmentation not loaded: falls back to detection
    assert_eq!(analysis["model_type"], "detection");
    assert_eq!(analysis["detections"][0]["class"], "disease");
    assert_eq!(analysis["detections"][0]["count"], 2);
    assert_eq!(analysis["detections"][0]["confidence"], 80.0);
    assert_eq!(analysis["recommendations"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_analyze_threshold_filters_detections() {
    let png = png_bytes();
    let request = multipart_request(&[
        Part::File {
            filename: "leaf.jpg",
            data: &png,
        },
        Part::Text {
            name: "conf_threshold",
            value: "0.95",
        },
    ]);
    let (status, body) = send(stub_router(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analysis"]["total_detections"], 0);
    assert_eq!(body["analysis"]["status"], "healthy");
}

#[tokio::test]
async fn test_analyze_without_file() {
    let request = multipart_request(&[Part::Text {
        name: "model_type",
        value: "detection",
    }]);
    let (status, body) = send(stub_router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test]
async fn test_analyze_empty_filename() {
    let request = multipart_request(&[Part::File {
        filename: "",
        data: b"",
    }]);
    let (status, body) = send(stub_router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file selected");
}

#[tokio::test]
async fn test_analyze_rejects_extension() {
    let request = multipart_request(&[Part::File {
        filename: "notes.txt",
        data: b"hello",
    }]);
    let (status, body) = send(stub_router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid file type");
}

#[tokio::test]
async fn test_analyze_rejects_out_of_range_confidence() {
    let png = png_bytes();
    let request = multipart_request(&[
        Part::File {
            filename: "leaf.png",
            data: &png,
        },
        Part::Text {
            name: "conf_threshold",
            value: "1.5",
        },
    ]);
    let (status, body) = send(stub_router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_analyze_unparsable_confidence() {
    let png = png_bytes();
    let request = multipart_request(&[
        Part::File {
            filename: "leaf.png",
            data: &png,
        },
        Part::Text {
            name: "conf_threshold",
            value: "high",
        },
    ]);
    let (status, body) = send(stub_router(), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_analyze_undecodable_image() {
    let request = multipart_request(&[Part::File {
        filename: "leaf.png",
        data: b"not really a png",
    }]);
    let (status, body) = send(stub_router(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("decode"));
}

#[tokio::test]
async fn test_analyze_backend_failure() {
    let png = png_bytes();
    let request = multipart_request(&[Part::File {
        filename: "leaf.png",
        data: &png,
    }]);
    let (status, body) = send(router(Arc::new(FailingBackend)), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("No models available"));
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let state = AppState {
        backend: Arc::new(FailingBackend),
        default_confidence: 0.25,
    };
    let app = create_router(state, None, 64);
    let big = vec![0u8; 4096];
    let request = multipart_request(&[Part::File {
        filename: "leaf.png",
        data: &big,
    }]);
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_static_ui_is_served_without_html_injection() {
    let static_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("static");
    let state = AppState {
        backend: Arc::new(FailingBackend),
        default_confidence: 0.25,
    };
    let app = create_router(state, Some(&static_dir), 1024);

    let request = Request::builder()
        .uri("/index.html")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let page = String::from_utf8(page.to_vec()).unwrap();

    // class names and advice are model-supplied text
    assert!(page.contains("/api/analyze"));
    assert!(page.contains("textContent"));
    assert!(!page.contains("innerHTML"));
}
