//! HTTP tests for the prediction API.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use churnline::model::{ChurnModel, Dataset, FitParams, Record};
use churnline::serving::{router, FileLoader, StaticLoader};
use serde_json::{json, Value};
use tower::ServiceExt;

fn records(values: &[Value]) -> Vec<Record> {
    values
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

/// Churns when tenure is short and charges are high.
fn toy_model() -> ChurnModel {
    let rows: Vec<Value> = (0..40)
        .map(|i| {
            let churn = i % 2;
            json!({
                "tenure": 50 - 45 * churn + i % 4,
                "monthly_charges": 20 + 60 * churn + i % 5,
                "churn": churn,
            })
        })
        .collect();
    let dataset = Dataset::from_records(&records(&rows), "churn").unwrap();
    ChurnModel::fit(&dataset, &FitParams::default()).unwrap()
}

fn app() -> Router {
    router(Arc::new(StaticLoader::new(toy_model())))
}

fn post_predict(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_two_feature_request_gets_two_predictions() {
    let training = records(&[
        json!({"f1": 0, "f2": 0, "y": 0}),
        json!({"f1": 1, "f2": 1, "y": 1}),
    ]);
    let model = ChurnModel::fit(
        &Dataset::from_records(&training, "y").unwrap(),
        &FitParams::default(),
    )
    .unwrap();
    let app = router(Arc::new(StaticLoader::new(model)));

    let body = r#"{"data":[{"f1":0,"f2":0},{"f1":1,"f2":1}]}"#;
    let (status, json) = send(app, post_predict(body)).await;

    assert_eq!(status, StatusCode::OK);
    let predictions = json["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 2);
    assert!(predictions.iter().all(|p| p == 0 || p == 1));
    assert_eq!(json, json!({"predictions": [0, 1]}));
}

#[tokio::test]
async fn test_predict_returns_one_label_per_record() {
    let body = json!({"data": [
        {"tenure": 60, "monthly_charges": 20},
        {"tenure": 2, "monthly_charges": 85},
    ]});
    let (status, json) = send(app(), post_predict(body.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"predictions": [0, 1]}));
}

#[tokio::test]
async fn test_extra_fields_are_ignored() {
    let body = json!({"data": [
        {"tenure": 2, "monthly_charges": 85, "customer_id": "C-17"},
    ]});
    let (status, json) = send(app(), post_predict(body.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["predictions"], json!([1]));
}

#[tokio::test]
async fn test_missing_field_is_client_error_and_server_recovers() {
    let app = app();

    let bad = json!({"data": [{"tenure": 12}]});
    let (status, json) = send(app.clone(), post_predict(bad.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let detail = json["detail"].as_str().unwrap();
    assert!(detail.contains("monthly_charges"));

    let good = json!({"data": [{"tenure": 60, "monthly_charges": 20}]});
    let (status, json) = send(app, post_predict(good.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["predictions"], json!([0]));
}

#[tokio::test]
async fn test_non_numeric_field_is_client_error() {
    let body = json!({"data": [{"tenure": "long", "monthly_charges": 20}]});
    let (status, json) = send(app(), post_predict(body.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!json["detail"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_client_error() {
    let (status, json) = send(app(), post_predict("{\"data\": [")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["detail"].is_string());

    let (status, _) = send(app(), post_predict("{\"records\": []}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_data_is_client_error() {
    let (status, json) = send(app(), post_predict(json!({"data": []}).to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["detail"].as_str().unwrap().contains("at least one"));
}

#[tokio::test]
async fn test_missing_model_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(Arc::new(FileLoader::new(dir.path().join("absent.json"))));

    let body = json!({"data": [{"tenure": 1, "monthly_charges": 1}]});
    let (status, json) = send(app, post_predict(body.to_string())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["detail"].as_str().unwrap().contains("absent.json"));
}

#[tokio::test]
async fn test_file_loader_serves_deploy_copy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("best_model_run.json");
    std::fs::write(&path, toy_model().to_bytes().unwrap()).unwrap();
    let app = router(Arc::new(FileLoader::new(&path)));

    let body = json!({"data": [{"tenure": 2, "monthly_charges": 85}]});
    let (status, json) = send(app, post_predict(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["predictions"], json!([1]));
}

#[tokio::test]
async fn test_health() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "ok"}));
}
