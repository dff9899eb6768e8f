//! HTTP API tests
//!
//! Routes are driven through `warp::test` with a stub remover, so no model
//! is downloaded or run.

use bg_composite::{
    config::ServerConfig,
    error::Result,
    removal::BackgroundRemover,
    server::{routes, AppState},
    services::{ImageCodec, PNG_DATA_URL_PREFIX},
    types::RasterImage,
};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use serde_json::{json, Value};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const BOUNDARY: &str = "----bg-composite-test-boundary";

/// Keeps colour and makes the left half of the image transparent
struct LeftHalfTransparent;

impl BackgroundRemover for LeftHalfTransparent {
    fn remove(&self, image: &DynamicImage) -> Result<RasterImage> {
        let mut rgba = image.to_rgba8();
        let half = rgba.width() / 2;
        for (x, _, pixel) in rgba.enumerate_pixels_mut() {
            pixel[3] = if x < half { 0 } else { 255 };
        }
        Ok(rgba)
    }

    fn name(&self) -> String {
        "left-half".to_string()
    }
}

fn api_with(config: &ServerConfig) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    routes(AppState::new(Arc::new(LeftHalfTransparent)), config)
}

fn api() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    api_with(&ServerConfig::default())
}

fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    ImageCodec::encode_rgba_png(image).unwrap()
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

async fn post_upload(field: &str, bytes: &[u8]) -> warp::http::Response<bytes::Bytes> {
    warp::test::request()
        .method("POST")
        .path("/remove-background")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart_body(field, bytes))
        .reply(&api())
        .await
}

async fn post_composite(body: &Value) -> warp::http::Response<bytes::Bytes> {
    warp::test::request()
        .method("POST")
        .path("/composite-image")
        .json(body)
        .reply(&api())
        .await
}

#[tokio::test]
async fn test_health() {
    let resp = warp::test::request().path("/health").reply(&api()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp.body()), json!({"status": "healthy"}));
}

#[tokio::test]
async fn test_health_unaffected_by_earlier_requests() {
    let api = api();

    let failed = warp::test::request()
        .method("POST")
        .path("/remove-background")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart_body("image", b"not an image"))
        .reply(&api)
        .await;
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let pixel = ImageCodec::rgba_to_data_url(&RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])))
        .unwrap();
    let composited = warp::test::request()
        .method("POST")
        .path("/composite-image")
        .json(&json!({"personImage": pixel, "backgroundImage": pixel}))
        .reply(&api)
        .await;
    assert_eq!(composited.status(), StatusCode::OK);

    for _ in 0..2 {
        let resp = warp::test::request().path("/health").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp.body()), json!({"status": "healthy"}));
    }
}

#[tokio::test]
async fn test_index_page() {
    let resp = warp::test::request().path("/").reply(&api()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = String::from_utf8(resp.body().to_vec()).unwrap();
    assert!(html.contains("/remove-background"));
    assert!(html.contains("/composite-image"));
}

#[tokio::test]
async fn test_remove_background_success() {
    let upload = png_bytes(&RgbaImage::from_pixel(8, 4, Rgba([10, 20, 30, 255])));
    let resp = post_upload("image", &upload).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp.body());
    assert_eq!(body["success"], true);
    let data_url = body["image"].as_str().unwrap();
    assert!(data_url.starts_with(PNG_DATA_URL_PREFIX));

    let cut_out = ImageCodec::decode_data_url(data_url).unwrap().to_rgba8();
    assert_eq!(cut_out.dimensions(), (8, 4));
    assert_eq!(cut_out.get_pixel(0, 0), &Rgba([10, 20, 30, 0]));
    assert_eq!(cut_out.get_pixel(7, 3), &Rgba([10, 20, 30, 255]));
}

#[tokio::test]
async fn test_remove_background_accepts_rgb_jpeg() {
    let jpeg = {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([200, 100, 50])));
        let mut buffer = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Jpeg)
            .unwrap();
        buffer
    };
    let resp = post_upload("image", &jpeg).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_remove_background_missing_field() {
    let upload = png_bytes(&RgbaImage::new(2, 2));
    let resp = post_upload("picture", &upload).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp.body()), json!({"error": "No image provided"}));
}

#[tokio::test]
async fn test_remove_background_empty_file() {
    let resp = post_upload("image", b"").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp.body()), json!({"error": "No image provided"}));
}

#[tokio::test]
async fn test_remove_background_not_multipart() {
    let resp = warp::test::request()
        .method("POST")
        .path("/remove-background")
        .json(&json!({"image": "nope"}))
        .reply(&api())
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp.body()), json!({"error": "No image provided"}));
}

#[tokio::test]
async fn test_remove_background_undecodable_upload() {
    let resp = post_upload("image", b"definitely not an image").await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json_body(resp.body())["error"].is_string());
}

#[tokio::test]
async fn test_composite_success() {
    let person = ImageCodec::rgba_to_data_url(&RgbaImage::from_pixel(10, 20, Rgba([255, 0, 0, 255])))
        .unwrap();
    let background =
        ImageCodec::rgba_to_data_url(&RgbaImage::from_pixel(100, 100, Rgba([0, 0, 255, 255])))
            .unwrap();

    let resp = post_composite(&json!({"personImage": person, "backgroundImage": background})).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp.body());
    assert_eq!(body["success"], true);
    let out = ImageCodec::decode_data_url(body["image"].as_str().unwrap())
        .unwrap()
        .to_rgba8();
    assert_eq!(out.dimensions(), (100, 100));
    // 40x80 subject at (30, 0)
    assert_eq!(out.get_pixel(50, 40), &Rgba([255, 0, 0, 255]));
    assert_eq!(out.get_pixel(5, 40), &Rgba([0, 0, 255, 255]));
    assert_eq!(out.get_pixel(50, 90), &Rgba([0, 0, 255, 255]));
}

#[tokio::test]
async fn test_composite_missing_fields() {
    let background =
        ImageCodec::rgba_to_data_url(&RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))).unwrap();

    let resp = post_composite(&json!({"backgroundImage": background})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp.body()), json!({"error": "No person image provided"}));

    let resp = post_composite(&json!({"personImage": background})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(resp.body()),
        json!({"error": "No background image provided"})
    );
}

#[tokio::test]
async fn test_composite_bad_payloads() {
    let good = ImageCodec::rgba_to_data_url(&RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])))
        .unwrap();

    // No comma
    let resp = post_composite(&json!({"personImage": "garbage", "backgroundImage": good})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Invalid base64
    let resp = post_composite(&json!({"personImage": "data:image/png;base64,@@@", "backgroundImage": good}))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Valid base64, not an image
    let resp = post_composite(&json!({"personImage": "data:image/png;base64,aGVsbG8=", "backgroundImage": good}))
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Subject without alpha
    let rgb = {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        ImageCodec::png_data_url(&ImageCodec::encode_png(&image).unwrap())
    };
    let resp = post_composite(&json!({"personImage": rgb, "backgroundImage": good})).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_composite_invalid_json() {
    let resp = warp::test::request()
        .method("POST")
        .path("/composite-image")
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&api())
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(resp.body())["error"].is_string());
}

#[tokio::test]
async fn test_body_limit() {
    let config = ServerConfig::builder().max_body_bytes(256).build().unwrap();
    let resp = warp::test::request()
        .method("POST")
        .path("/composite-image")
        .json(&json!({"personImage": "x".repeat(1024), "backgroundImage": "y"}))
        .reply(&api_with(&config))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_and_wrong_method() {
    let resp = warp::test::request().path("/nope").reply(&api()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp.body()), json!({"error": "Not found"}));

    let resp = warp::test::request()
        .method("GET")
        .path("/remove-background")
        .reply(&api())
        .await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_cors_headers() {
    let resp = warp::test::request()
        .path("/health")
        .header("origin", "https://example.com")
        .reply(&api())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_static_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.js"), "console.log('hi');").unwrap();
    let config = ServerConfig::builder().static_dir(dir.path()).build().unwrap();

    let resp = warp::test::request()
        .path("/static/app.js")
        .reply(&api_with(&config))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.body().as_ref(), b"console.log('hi');");

    let resp = warp::test::request()
        .path("/static/missing.js")
        .reply(&api_with(&config))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
