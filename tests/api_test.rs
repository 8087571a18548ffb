//! PMML 採点 API のルーティングとレスポンス。
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::LINK},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use doc_classifier::{
    analysis::{CorpusShape, synthetic_dataset},
    app::{ComponentRegistry, build_router},
    classification::{PipelineConfig, TextPipeline},
    config::Config,
    export::PmmlExporter,
    observability::Telemetry,
    pmml::PmmlModel,
};

struct Fixture {
    router: Router,
    document: String,
    expected: String,
}

fn fixture() -> Fixture {
    let dataset = synthetic_dataset(CorpusShape::default(), 11);
    let contents = dataset.contents();
    let (categories, labels) = dataset.encoded_labels();
    let pipeline =
        TextPipeline::fit(&PipelineConfig::export(150), &contents, &labels, categories).expect("fit");

    let xml = PmmlExporter::to_xml(&pipeline).expect("pmml");
    let model = PmmlModel::from_xml(&xml).expect("reload");
    let document = contents[0].to_string();
    let expected = model.predict(&document).expect("predict").category;

    let config = Config::from_env().expect("default config");
    let telemetry = Telemetry::without_tracing().expect("telemetry");
    let registry = ComponentRegistry::from_parts(config, telemetry, model);
    Fixture {
        router: build_router(registry),
        document,
        expected,
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&body).expect("json body")
}

fn post_predict(payload: &Value) -> Request<Body> {
    Request::post("/predict")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

#[tokio::test]
async fn post_predict_returns_category_and_confidence() {
    let fixture = fixture();
    let response = fixture
        .router
        .oneshot(post_predict(&json!({ "words": fixture.document })))
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["result"], fixture.expected.as_str());
    let confidence = body["confidence"].as_f64().expect("confidence");
    assert!(confidence > 0.0 && confidence <= 1.0);
}

#[tokio::test]
async fn get_predict_decodes_path_words() {
    let fixture = fixture();
    let path = format!("/predict/{}", fixture.document.replace(' ', "%20"));
    let request = Request::get(path).body(Body::empty()).expect("request builds");

    let response = fixture.router.oneshot(request).await.expect("request succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["result"], fixture.expected.as_str());
}

#[tokio::test]
async fn empty_or_missing_words_are_rejected() {
    let fixture = fixture();
    for payload in [json!({ "words": "   " }), json!({})] {
        let response = fixture
            .router
            .clone()
            .oneshot(post_predict(&payload))
            .await
            .expect("request succeeds");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn root_advertises_links_without_content() {
    let fixture = fixture();
    let request = Request::get("/").body(Body::empty()).expect("request builds");

    let response = fixture.router.oneshot(request).await.expect("request succeeds");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let links: Vec<&str> = response
        .headers()
        .get_all(LINK)
        .iter()
        .map(|value| value.to_str().expect("ascii"))
        .collect();
    assert_eq!(links, vec![r#"<predict>; rel="restconf""#, r#"<index.html>; rel="index""#]);
}

#[tokio::test]
async fn probes_and_metrics_respond() {
    let fixture = fixture();
    let router = fixture.router;

    let ping = router
        .clone()
        .oneshot(Request::get("/ping").body(Body::empty()).expect("request builds"))
        .await
        .expect("ping");
    assert_eq!(ping.status(), StatusCode::OK);

    let ready = router
        .clone()
        .oneshot(Request::get("/health/ready").body(Body::empty()).expect("request builds"))
        .await
        .expect("ready");
    assert_eq!(ready.status(), StatusCode::OK);
    let body = json_body(ready).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["categories"], 4);

    let live = router
        .clone()
        .oneshot(Request::get("/health/live").body(Body::empty()).expect("request builds"))
        .await
        .expect("live");
    assert_eq!(json_body(live).await["status"], "live");

    router
        .clone()
        .oneshot(post_predict(&json!({ "words": fixture.document })))
        .await
        .expect("predict");
    let metrics = router
        .oneshot(Request::get("/metrics").body(Body::empty()).expect("request builds"))
        .await
        .expect("metrics");
    assert_eq!(metrics.status(), StatusCode::OK);
    let text = String::from_utf8(
        axum::body::to_bytes(metrics.into_body(), usize::MAX)
            .await
            .expect("body")
            .to_vec(),
    )
    .expect("utf8");
    assert!(text.contains("doc_classifier_predictions_total 1"));
    assert!(text.contains("doc_classifier_model_terms 150"));
}
