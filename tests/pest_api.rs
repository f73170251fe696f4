mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

use common::{body_json, eventually, FakeProvider, TestApp};
use farmwise_gateway::store::FarmStore;

const BOUNDARY: &str = "farmwise-test-boundary";

fn multipart(fields: &[(&str, &str)], image: Option<&[u8]>) -> Request<Body> {
    signed_multipart(fields, image, None)
}

fn signed_multipart(fields: &[(&str, &str)], image: Option<&[u8]>, token: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"leaf.png\"\r\n\
                 Content-Type: image/png\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/pest-detection")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

fn analysis() -> Value {
    json!({
        "pestIdentified": "Early blight",
        "confidence": 78.5,
        "severity": "high",
        "description": "Fungal disease causing concentric ring lesions",
        "symptoms": ["Brown spots with rings", "Yellowing lower leaves"],
        "treatment": {
            "immediate": ["Remove infected leaves", "Apply copper fungicide"],
            "longTerm": ["Rotate crops"],
            "organic": ["Neem extract"],
            "chemical": ["Mancozeb"]
        },
        "prevention": ["Avoid overhead watering"],
        "economicImpact": "Yield losses of 20-30% if untreated"
    })
}

#[tokio::test]
async fn test_missing_image_is_400_even_without_credentials() {
    let app = TestApp::new(None);

    let response = app
        .send(multipart(&[("cropType", "tomato"), ("symptoms", "spots")], None))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "No image provided"}));

    let response = app.send(multipart(&[("cropType", "tomato")], Some(b""))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "No image provided"}));
}

#[tokio::test]
async fn test_non_multipart_body_is_400() {
    let app = TestApp::new(Some(Arc::new(FakeProvider::diagnosing(analysis()))));
    let request = Request::builder()
        .method("POST")
        .uri("/api/pest-detection")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "No image provided"}));
}

#[tokio::test]
async fn test_image_without_credentials_is_500() {
    let app = TestApp::new(None);
    let response = app
        .send(multipart(&[("cropType", "tomato"), ("symptoms", "spots")], Some(b"\x89PNG")))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_successful_analysis_is_returned_and_recorded() {
    let provider = Arc::new(FakeProvider::diagnosing(analysis()));
    let app = TestApp::new(Some(provider.clone()));
    let (token, farmer_id) = app.sign_up("meena@example.in", "Meena").await;

    let response = app
        .send(signed_multipart(
            &[("cropType", "tomato"), ("symptoms", "ringed spots")],
            Some(b"\x89PNG\r\n"),
            Some(&token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["analysis"], analysis());

    let requests = provider.structured_requests.lock().unwrap().clone();
    let message = serde_json::to_value(&requests[0].messages[0]).unwrap();
    assert!(message["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("tomato plant showing these symptoms: ringed spots"));
    assert!(message["content"][1]["image_url"]["url"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let store = app.store.clone();
    let owner = farmer_id.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            let owner = owner.clone();
            async move { !store.list_pest_detections(&owner, 5).await.unwrap().is_empty() }
        })
        .await
    );
    let detections = app.store.list_pest_detections(&farmer_id, 5).await.unwrap();
    assert_eq!(detections[0].pest_identified, "Early blight");
    assert_eq!(detections[0].crop_type, "tomato");
    assert!((detections[0].confidence_score - 0.785).abs() < 1e-9);
    assert_eq!(
        detections[0].treatment_recommendations,
        "Remove infected leaves, Apply copper fungicide"
    );
}

#[tokio::test]
async fn test_invalid_analysis_is_generic_500() {
    let mut bad = analysis();
    bad["confidence"] = json!(250);
    let app = TestApp::new(Some(Arc::new(FakeProvider::diagnosing(bad))));

    let response = app
        .send(multipart(&[("cropType", "rice"), ("symptoms", "blast")], Some(b"img")))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await, json!({"error": "Failed to analyze image"}));
}

#[tokio::test]
async fn test_anonymous_analysis_is_not_recorded_for_form_farmer_id() {
    let app = TestApp::new(Some(Arc::new(FakeProvider::diagnosing(analysis()))));
    let (_, farmer_id) = app.sign_up("gopal@example.in", "Gopal").await;

    let response = app
        .send(multipart(
            &[("cropType", "cotton"), ("symptoms", "holes"), ("farmerId", &farmer_id)],
            Some(b"img"),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // A signed-in upload afterwards proves the worker has drained the queue.
    let (token, other_id) = app.sign_up("devi@example.in", "Devi").await;
    let response = app
        .send(signed_multipart(&[("cropType", "cotton")], Some(b"img"), Some(&token)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let store = app.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            let other_id = other_id.clone();
            async move { !store.list_pest_detections(&other_id, 5).await.unwrap().is_empty() }
        })
        .await
    );

    assert!(app.store.list_pest_detections(&farmer_id, 5).await.unwrap().is_empty());
}
