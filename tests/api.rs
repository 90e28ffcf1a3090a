//! `/predict/` と `/health` をルーター越しに検証する

use std::io::Cursor;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use tower::ServiceExt;

use pawdentify_lib::breed_info::{BreedInfoStore, NOT_AVAILABLE};
use pawdentify_lib::labels::Categories;
use pawdentify_lib::ml::BreedModel;
use pawdentify_lib::preprocess::ImageBatch;
use pawdentify_lib::server::{router, AppState};
use pawdentify_lib::{PawError, Result};

const BOUNDARY: &str = "pawdentify-test-boundary";

const BREED_INFO: &str = r#"{
    "labrador_retriever": {
        "nature": "Friendly and outgoing",
        "diet": "High-protein kibble",
        "healthcare_tips": "Watch for hip dysplasia"
    },
    "pug": { "nature": "Charming" }
}"#;

/// 平均輝度に応じて確率を返すスタブ（同じ画像なら同じ出力）
struct StubModel {
    categories: Categories,
    fail: bool,
}

impl StubModel {
    fn new() -> Self {
        Self {
            categories: Categories::from_ordered(vec![
                "akita".to_string(),
                "labrador_retriever".to_string(),
                "pug".to_string(),
                "shiba_inu".to_string(),
            ])
            .unwrap(),
            fail: false,
        }
    }
}

impl BreedModel for StubModel {
    fn input_size(&self) -> u32 {
        16
    }

    fn categories(&self) -> &Categories {
        &self.categories
    }

    fn predict(&self, batch: &ImageBatch) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(PawError::Model("backend unavailable".to_string()));
        }
        let [n, h, w, c] = batch.dims();
        assert_eq!([h, w, c], [16, 16, 3]);
        let mean = batch.as_slice().iter().sum::<f32>() / batch.as_slice().len() as f32;
        // 明るい画像ほど labrador_retriever、暗い画像ほど shiba_inu
        let row = if mean > 0.5 {
            vec![0.1, 0.6, 0.2, 0.1]
        } else {
            vec![0.05, 0.15, 0.1, 0.7]
        };
        Ok(vec![row; n])
    }
}

fn app_with(model: StubModel) -> Router {
    let state = AppState::new(Arc::new(model), BreedInfoStore::from_json_str(BREED_INFO).unwrap());
    router(Arc::new(state), 1024 * 1024)
}

fn app() -> Router {
    app_with(StubModel::new())
}

fn png_bytes(width: u32, height: u32, value: u8) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value, value, value])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
}

fn multipart_request(field: &str, contents: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"dog.png\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/predict/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn predict_returns_sorted_top3() {
    let (status, body) = send(app(), multipart_request("file", &png_bytes(64, 48, 230))).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(body["predicted_breed"], "labrador_retriever");
    assert_eq!(body["confidence"].as_f64().unwrap(), 60.0);

    let top3 = body["top3"].as_array().unwrap();
    assert_eq!(top3.len(), 3);
    assert_eq!(top3[0]["breed"], body["predicted_breed"]);
    assert_eq!(top3[1]["breed"], "pug");
    let confidences: Vec<f64> = top3.iter().map(|s| s["confidence"].as_f64().unwrap()).collect();
    assert!(confidences.windows(2).all(|w| w[0] >= w[1]));
    assert!(confidences.iter().all(|c| (0.0..=100.0).contains(c)));

    assert_eq!(body["info"]["nature"], "Friendly and outgoing");
    assert!(body["image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn predict_accepts_path_without_trailing_slash() {
    let mut request = multipart_request("file", &png_bytes(20, 20, 230));
    *request.uri_mut() = "/predict".parse().unwrap();
    let (status, _) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn empty_upload_is_rejected() {
    let (status, body) = send(app(), multipart_request("file", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("Empty"));
}

#[tokio::test]
async fn undecodable_upload_is_rejected() {
    let (status, body) = send(app(), multipart_request("file", b"definitely not an image")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Could not decode image");
}

#[tokio::test]
async fn oversized_upload_is_payload_too_large() {
    let state = AppState::new(
        Arc::new(StubModel::new()),
        BreedInfoStore::from_json_str(BREED_INFO).unwrap(),
    );
    let app = router(Arc::new(state), 512);
    let (status, body) = send(app, multipart_request("file", &vec![7u8; 4096])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["detail"], "File too large");
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let (status, body) = send(app(), multipart_request("photo", &png_bytes(8, 8, 10))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("file"));
}

#[tokio::test]
async fn unknown_breed_gets_placeholder_info() {
    let (status, body) = send(app(), multipart_request("file", &png_bytes(32, 32, 10))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predicted_breed"], "shiba_inu");
    for field in ["nature", "diet", "healthcare_tips"] {
        assert_eq!(body["info"][field], NOT_AVAILABLE);
    }
}

#[tokio::test]
async fn partial_breed_info_fills_missing_fields() {
    struct PugModel(StubModel);
    impl BreedModel for PugModel {
        fn input_size(&self) -> u32 {
            self.0.input_size()
        }
        fn categories(&self) -> &Categories {
            self.0.categories()
        }
        fn predict(&self, batch: &ImageBatch) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![0.1, 0.1, 0.7, 0.1]; batch.dims()[0]])
        }
    }

    let state = AppState::new(
        Arc::new(PugModel(StubModel::new())),
        BreedInfoStore::from_json_str(BREED_INFO).unwrap(),
    );
    let app = router(Arc::new(state), 1024 * 1024);
    let (status, body) = send(app, multipart_request("file", &png_bytes(16, 16, 100))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predicted_breed"], "pug");
    assert_eq!(body["info"]["nature"], "Charming");
    assert_eq!(body["info"]["diet"], NOT_AVAILABLE);
}

#[tokio::test]
async fn same_image_gives_same_prediction() {
    let image = png_bytes(50, 70, 200);
    let (_, first) = send(app(), multipart_request("file", &image)).await;
    let (_, second) = send(app(), multipart_request("file", &image)).await;
    assert_eq!(first["predicted_breed"], second["predicted_breed"]);
    assert_eq!(first["confidence"], second["confidence"]);
    assert_eq!(first["top3"], second["top3"]);
}

#[tokio::test]
async fn inference_failure_is_internal_error() {
    let mut model = StubModel::new();
    model.fail = true;
    let (status, body) = send(app_with(model), multipart_request("file", &png_bytes(16, 16, 200))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Prediction failed: "));
}

#[tokio::test]
async fn health_reports_category_count() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["categories"], 4);
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
