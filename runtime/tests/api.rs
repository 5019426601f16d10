use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tower::ServiceExt;

use krypton_runtime::{
    AppState,
    airtable::{InMemoryOntologyRepository, OntologyService},
    build_router,
    config::AppConfig,
    pipeline::{
        AnalysisResult, Chunk, ChunkConfig, DocumentAnalyzer, DocumentExtractor,
        SuggestedEdgeType, SuggestedEntityType, TiktokenTokenizer, TokenizerChunker,
        TypeSuggestionEngine, TypeSuggestions, Utf8DocumentExtractor,
    },
    storage::TtlCache,
    validation::UploadValidator,
};

struct StubEngine {
    calls: AtomicUsize,
}

#[async_trait]
impl TypeSuggestionEngine for StubEngine {
    async fn generate_type_suggestions(&self, _content: &str) -> Result<TypeSuggestions> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TypeSuggestions {
            entity_types: vec![SuggestedEntityType {
                name: "Researcher".into(),
                description: "People doing research".into(),
                examples: vec!["Ada Lovelace".into()],
                confidence: 0.9,
            }],
            edge_types: vec![SuggestedEdgeType {
                name: "WORKS_AT".into(),
                description: String::new(),
                source_types: vec!["Researcher".into()],
                target_types: vec!["Institution".into()],
                confidence: 0.7,
            }],
            classification_rate: 0.0,
        })
    }
}

struct GatedExtractor {
    gate: Arc<Notify>,
}

#[async_trait]
impl DocumentExtractor for GatedExtractor {
    fn supports(&self, _extension: &str) -> bool {
        true
    }

    async fn extract(&self, _: &str, _: &str, bytes: &[u8]) -> Result<String> {
        self.gate.notified().await;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    repo: Arc<InMemoryOntologyRepository>,
    engine: Arc<StubEngine>,
}

fn test_app_with(extractor: Arc<dyn DocumentExtractor>) -> Result<TestApp> {
    let config = AppConfig::default();
    let repo = Arc::new(InMemoryOntologyRepository::new());
    let engine = Arc::new(StubEngine {
        calls: AtomicUsize::new(0),
    });
    let chunker = Arc::new(TokenizerChunker::new(Arc::new(TiktokenTokenizer::new()?)));

    let state = Arc::new(AppState {
        suggestions_cache: Arc::new(TtlCache::new(config.suggestions.cache_ttl())),
        analyzer: Arc::new(DocumentAnalyzer::new(
            extractor,
            chunker.clone(),
            ChunkConfig::from(config.chunking.clone()),
        )),
        engine: Some(engine.clone()),
        ontologies: OntologyService::new(repo.clone()),
        airtable: None,
        chunker,
        uploads: UploadValidator::new(&config.uploads),
        config: Arc::new(config),
    });

    Ok(TestApp {
        router: build_router(state.clone()),
        state,
        repo,
        engine,
    })
}

fn test_app() -> Result<TestApp> {
    test_app_with(Arc::new(Utf8DocumentExtractor))
}

async fn send(router: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Ok((status, body))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn entity_types(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| json!({ "name": format!("Entity{i}"), "description": "d", "examples": [] }))
        .collect()
}

fn edge_types(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| json!({ "name": format!("EDGE_{i}"), "sourceTypes": ["Entity0"], "targetTypes": ["Entity1"] }))
        .collect()
}

async fn seed_analysis(state: &AppState, document_id: &str) {
    state
        .analyzer
        .store_result(AnalysisResult {
            document_id: document_id.to_string(),
            content_id: "content-seeded".into(),
            content: "Ada Lovelace worked with Charles Babbage.".into(),
            chunks: vec![
                Chunk {
                    id: "chunk-a".into(),
                    content: "Ada Lovelace worked with Charles Babbage.".into(),
                    order: 0,
                    token_count: 8,
                },
                Chunk {
                    id: "chunk-b".into(),
                    content: "The engine was never finished.".into(),
                    order: 1,
                    token_count: 6,
                },
            ],
            word_count: 6,
            completed_at: Utc::now(),
        })
        .await;
}

#[tokio::test]
async fn health_reports_ok() -> Result<()> {
    let app = test_app()?;
    let (status, body) = send(&app.router, get("/health")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
    Ok(())
}

#[tokio::test]
async fn accepting_too_many_entity_types_is_rejected() -> Result<()> {
    let app = test_app()?;
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/documents/doc-1/suggestions",
            json!({ "entityTypes": entity_types(11), "edgeTypes": [] }),
        ),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Maximum 10 entity types allowed");
    Ok(())
}

#[tokio::test]
async fn accepting_too_many_edge_types_is_rejected() -> Result<()> {
    let app = test_app()?;
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/documents/doc-1/suggestions",
            json!({ "entityTypes": entity_types(2), "edgeTypes": edge_types(11) }),
        ),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Maximum 10 edge types allowed");
    Ok(())
}

#[tokio::test]
async fn accepting_suggestions_creates_ontology() -> Result<()> {
    let app = test_app()?;
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/documents/doc-1/suggestions",
            json!({ "entityTypes": entity_types(5), "edgeTypes": edge_types(3) }),
        ),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["entityTypesCount"], 5);
    assert_eq!(body["edgeTypesCount"], 3);

    let ontology_id = body["ontologyId"].as_str().unwrap();
    assert_eq!(app.repo.type_counts(ontology_id).await, Some((5, 3)));
    Ok(())
}

#[tokio::test]
async fn suggestions_for_unknown_document_are_not_found() -> Result<()> {
    let app = test_app()?;
    let (status, body) = send(&app.router, get("/api/documents/missing/suggestions")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
    Ok(())
}

#[tokio::test]
async fn suggestions_are_generated_once_then_cached() -> Result<()> {
    let app = test_app()?;
    seed_analysis(&app.state, "doc-7").await;

    let (status, first) = send(&app.router, get("/api/documents/doc-7/suggestions")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "complete");
    assert_eq!(first["cached"], false);
    assert_eq!(first["entityTypes"][0]["name"], "Researcher");
    // one of two chunks mentions the example
    assert_eq!(first["classificationRate"], 0.5);

    let (_, second) = send(&app.router, get("/api/documents/doc-7/suggestions")).await?;
    assert_eq!(second["cached"], true);
    assert_eq!(second["edgeTypes"], first["edgeTypes"]);
    assert_eq!(app.engine.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn accepting_suggestions_clears_cached_entry() -> Result<()> {
    let app = test_app()?;
    seed_analysis(&app.state, "doc-8").await;
    send(&app.router, get("/api/documents/doc-8/suggestions")).await?;
    assert!(app.state.suggestions_cache.get("doc-8").await.is_some());

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/documents/doc-8/suggestions",
            json!({ "entityTypes": entity_types(1), "edgeTypes": [] }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(app.state.suggestions_cache.get("doc-8").await.is_none());
    Ok(())
}

#[tokio::test]
async fn running_analysis_reports_generating() -> Result<()> {
    let gate = Arc::new(Notify::new());
    let app = test_app_with(Arc::new(GatedExtractor { gate: gate.clone() }))?;
    let handle = app
        .state
        .analyzer
        .submit("doc-9", "notes.txt", b"Ada Lovelace".to_vec())
        .await?;

    let (status, body) = send(&app.router, get("/api/documents/doc-9/suggestions")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "generating");

    let (_, jobs) = send(&app.router, get("/api/documents/jobs")).await?;
    assert_eq!(jobs["total"], 1);
    assert_eq!(jobs["jobs"][0]["documentId"], "doc-9");

    gate.notify_one();
    handle.await?;
    let (_, body) = send(&app.router, get("/api/documents/doc-9/suggestions")).await?;
    assert_eq!(body["status"], "complete");
    Ok(())
}

#[tokio::test]
async fn reanalysed_document_gets_fresh_suggestions() -> Result<()> {
    let gate = Arc::new(Notify::new());
    let app = test_app_with(Arc::new(GatedExtractor { gate: gate.clone() }))?;

    let first = app
        .state
        .analyzer
        .submit("doc-r", "notes.txt", b"Ada Lovelace wrote a program.".to_vec())
        .await?;
    gate.notify_one();
    first.await?;
    send(&app.router, get("/api/documents/doc-r/suggestions")).await?;
    let (_, body) = send(&app.router, get("/api/documents/doc-r/suggestions")).await?;
    assert_eq!(body["cached"], true);

    let second = app
        .state
        .analyzer
        .submit("doc-r", "notes.txt", b"A rewritten note about proteins".to_vec())
        .await?;
    let (_, body) = send(&app.router, get("/api/documents/doc-r/suggestions")).await?;
    assert_eq!(body["status"], "generating");

    gate.notify_one();
    second.await?;
    let (status, body) = send(&app.router, get("/api/documents/doc-r/suggestions")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "complete");
    assert_eq!(body["cached"], false);
    // classification rate reflects the new text, which never mentions the example
    assert_eq!(body["classificationRate"], 0.0);
    assert_eq!(app.engine.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

fn multipart_upload(filename: &str, content_type: &str, content: &str) -> Request<Body> {
    let boundary = "krypton-test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"documentId\"\r\n\r\n\
         doc-upload\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: {content_type}\r\n\r\n\
         {content}\r\n\
         --{boundary}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/api/documents/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn upload_starts_analysis() -> Result<()> {
    let app = test_app()?;
    let (status, body) = send(
        &app.router,
        multipart_upload("notes.md", "text/markdown", "# Ontology\nAda Lovelace wrote notes."),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["documentId"], "doc-upload");
    assert_eq!(body["filename"], "notes.md");

    let mut result = None;
    for _ in 0..50 {
        result = app.state.analyzer.get_analysis_result("doc-upload").await;
        if result.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let result = result.expect("analysis should finish");
    assert!(result.content.contains("Ada Lovelace"));
    assert!(!result.chunks.is_empty());

    let (status, job) = send(&app.router, get("/api/documents/doc-upload/status")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "completed");
    Ok(())
}

#[tokio::test]
async fn reupload_evicts_cached_suggestions() -> Result<()> {
    let app = test_app()?;
    let upload = multipart_upload("notes.md", "text/markdown", "Ada Lovelace");
    let (status, _) = send(&app.router, upload).await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    for _ in 0..50 {
        if !app.state.analyzer.is_active("doc-upload").await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let (_, body) = send(&app.router, get("/api/documents/doc-upload/suggestions")).await?;
    assert_eq!(body["status"], "complete");
    assert!(app.state.suggestions_cache.get("doc-upload").await.is_some());

    let upload = multipart_upload("notes.md", "text/markdown", "Proteins fold");
    let (status, _) = send(&app.router, upload).await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(app.state.suggestions_cache.get("doc-upload").await.is_none());
    Ok(())
}

#[tokio::test]
async fn upload_rejects_unsupported_files() -> Result<()> {
    let app = test_app()?;
    let (status, body) = send(
        &app.router,
        multipart_upload("tool.exe", "application/octet-stream", "MZ"),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Unsupported file type"));
    assert!(app.state.analyzer.active_jobs().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn upload_rejects_formats_nothing_can_read() -> Result<()> {
    let app = test_app()?;

    // pdf is allowed but no conversion service is configured
    let (status, body) = send(
        &app.router,
        multipart_upload("paper.pdf", "application/pdf", "%PDF-1.7"),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("No text extractor"));

    let (status, body) = send(
        &app.router,
        multipart_upload("memo.docx", "application/octet-stream", "PK"),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Unsupported file type"));
    assert!(app.state.analyzer.active_jobs().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn chunk_preview_uses_request_overrides() -> Result<()> {
    let app = test_app()?;
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/documents/chunk-preview",
            json!({ "content": "first section\n\nsecond section", "splitBy": "\n\n" }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalChunks"], 2);
    assert_eq!(body["chunks"][1]["content"], "second section");

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/documents/chunk-preview",
            json!({ "content": "text", "maxTokens": 10, "overlapTokens": 10 }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

fn sample_graph() -> Value {
    json!({
        "nodes": [
            { "id": "n1", "label": "ontology-1", "type": "concept", "attributes": { "score": 9 } },
            { "id": "n2", "label": "Ada", "type": "entity", "attributes": { "score": 3 } },
            { "id": "n3", "label": "paper.pdf", "type": "document", "attributes": {} }
        ],
        "edges": [
            { "id": "e1", "source": "n1", "target": "n2", "type": "MENTIONS" },
            { "id": "e2", "source": "n2", "target": "n3", "type": "AUTHORED" }
        ],
        "metadata": { "nodeCount": 3, "edgeCount": 2 }
    })
}

#[tokio::test]
async fn graph_filter_prunes_dangling_edges() -> Result<()> {
    let app = test_app()?;
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/graph/filter",
            json!({ "graph": sample_graph(), "filters": { "entityTypes": ["concept", "entity"] } }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(body["edges"].as_array().unwrap().len(), 1);
    assert_eq!(body["edges"][0]["id"], "e1");
    assert_eq!(body["metadata"]["nodeCount"], 2);
    assert_eq!(body["metadata"]["edgeCount"], 1);

    let (_, body) = send(
        &app.router,
        post_json(
            "/api/graph/filter",
            json!({ "graph": sample_graph(), "filters": { "search": "ONT" } }),
        ),
    )
    .await?;
    assert_eq!(body["nodes"][0]["label"], "ontology-1");
    assert!(body["edges"].as_array().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn graph_export_as_csv_is_a_download() -> Result<()> {
    let app = test_app()?;
    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/graph/export?format=csv",
            json!({ "graph": sample_graph() }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()?
            .contains("graph-export.csv")
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let csv = String::from_utf8(bytes.to_vec())?;
    assert!(csv.starts_with("kind,id,label,type,source,target,weight,attributes\n"));
    assert_eq!(csv.lines().count(), 6);
    Ok(())
}

#[tokio::test]
async fn ontology_lifecycle_and_duplicate_names() -> Result<()> {
    let app = test_app()?;
    let (status, created) = send(
        &app.router,
        post_json("/api/ontologies", json!({ "name": "Clinical", "domain": "health" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "Draft");

    let (status, body) = send(
        &app.router,
        post_json("/api/ontologies", json!({ "name": " Clinical " })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "An ontology named 'Clinical' already exists");

    let id = created["id"].as_str().unwrap();
    let (status, published) = send(
        &app.router,
        post_json(&format!("/api/ontologies/{id}/publish"), json!({})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["status"], "Published");

    let (_, listed) = send(&app.router, get("/api/ontologies?status=published")).await?;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let (_, listed) = send(&app.router, get("/api/ontologies?domain=finance")).await?;
    assert!(listed.as_array().unwrap().is_empty());

    let (status, _) = send(
        &app.router,
        post_json("/api/ontologies/recMissing/deprecate", json!({})),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn airtable_proxy_requires_configuration() -> Result<()> {
    let app = test_app()?;
    let (status, _) = send(&app.router, get("/api/airtable/ontologies")).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&app.router, get("/api/airtable/unknown_table")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
