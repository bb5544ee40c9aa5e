//! Protocol surface tests against a stub origin.

use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::{Request, StatusCode};
use sdax_engine::codec::testing::FixedCodec;
use sdax_engine::{Engine, EngineConfig, IngestQueue, MemoryDictStore};
use sdax_proxy::{build_router, ProxyConfig, ProxyState, UpstreamClient};
use sdax_store::MemoryChunkStore;
use std::io::Write as _;
use tower::ServiceExt;

const ORIGIN_BODY: &[u8] = b"<html><body>a page that is long enough to be worth encoding</body></html>";

/// Starts a stub origin on an ephemeral port; returns its base URL.
async fn spawn_origin(gzip: bool) -> String {
    use axum::routing::get;

    let handler = move || async move {
        let mut response = axum::response::Response::new(Body::from(origin_bytes(gzip)));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, "text/html; charset=utf-8".parse().unwrap());
        if gzip {
            response
                .headers_mut()
                .insert(CONTENT_ENCODING, "gzip".parse().unwrap());
        }
        response
    };
    let app = Router::new()
        .route("/", get(handler))
        .route("/page", get(handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn origin_bytes(gzip: bool) -> Vec<u8> {
    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(ORIGIN_BODY).unwrap();
        encoder.finish().unwrap()
    } else {
        ORIGIN_BODY.to_vec()
    }
}

struct Fixture {
    router: Router,
    engine: Arc<Engine>,
}

async fn fixture(gzip_origin: bool, encoded: Vec<u8>) -> Fixture {
    let base = spawn_origin(gzip_origin).await;
    let engine = Arc::new(Engine::new(
        EngineConfig {
            domain: "origin.test".to_string(),
            port: 8080,
        },
        Arc::new(MemoryChunkStore::new()),
        Arc::new(MemoryDictStore::new()),
        Arc::new(FixedCodec::new(encoded, Vec::new())),
    ));
    let queue = IngestQueue::new(16);
    let state = Arc::new(ProxyState {
        engine: engine.clone(),
        queue,
        upstream: UpstreamClient::new(base.parse().unwrap()),
        config: ProxyConfig::default(),
    });
    Fixture {
        router: build_router(state),
        engine,
    }
}

fn seed_dictionary(engine: &Engine) {
    engine.ingest_body(&vec![0x41u8; 4096]).unwrap();
    assert!(engine.current().is_some());
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap()
}

#[tokio::test]
async fn client_without_sdch_gets_original_plus_get_dictionary() {
    let fx = fixture(false, Vec::new()).await;
    seed_dictionary(&fx.engine);
    let name = fx.engine.current().unwrap().name();

    let request = Request::builder()
        .uri("/page")
        .header("accept-encoding", "gzip")
        .body(Body::empty())
        .unwrap();
    let response = fx.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("get-dictionary").unwrap(),
        &format!("/_dictionary/origin.test:8080/{name}")
    );
    assert_eq!(response.headers().get("x-sdch-encode").unwrap(), "0");
    assert!(response.headers().get(CONTENT_ENCODING).is_none());
    assert_eq!(body_bytes(response).await.as_ref(), ORIGIN_BODY);
}

#[tokio::test]
async fn wrong_dictionary_id_gets_original() {
    let fx = fixture(false, b"tiny".to_vec()).await;
    seed_dictionary(&fx.engine);

    let request = Request::builder()
        .uri("/page")
        .header("accept-encoding", "sdch")
        .header("avail-dictionary", "AAAAAAAA")
        .body(Body::empty())
        .unwrap();
    let response = fx.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(CONTENT_ENCODING).is_none());
    assert_eq!(body_bytes(response).await.as_ref(), ORIGIN_BODY);
}

#[tokio::test]
async fn matching_dictionary_gets_framed_delta() {
    let fx = fixture(false, b"tiny delta".to_vec()).await;
    seed_dictionary(&fx.engine);
    let current = fx.engine.current().unwrap();

    let request = Request::builder()
        .uri("/page")
        .header("accept-encoding", "gzip, sdch")
        .header("avail-dictionary", current.hash.client_id())
        .body(Body::empty())
        .unwrap();
    let response = fx.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(CONTENT_ENCODING).unwrap(), "sdch");

    let body = body_bytes(response).await;
    assert_eq!(&body[..8], current.hash.server_id().as_bytes());
    assert_eq!(body[8], 0);
    assert_eq!(&body[9..], b"tiny delta");
}

#[tokio::test]
async fn no_dictionary_means_no_advertisement_and_no_encoding() {
    let fx = fixture(false, b"tiny".to_vec()).await;

    let request = Request::builder()
        .uri("/page")
        .header("accept-encoding", "sdch")
        .body(Body::empty())
        .unwrap();
    let response = fx.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("get-dictionary").is_none());
    assert_eq!(body_bytes(response).await.as_ref(), ORIGIN_BODY);
}

#[tokio::test]
async fn dictionary_download_roundtrip() {
    let fx = fixture(false, Vec::new()).await;
    seed_dictionary(&fx.engine);
    let current = fx.engine.current().unwrap();
    let name = current.name();

    let request = Request::builder()
        .uri(format!("/_dictionary/origin.test:8080/{name}"))
        .body(Body::empty())
        .unwrap();
    let response = fx.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/x-sdch-dictionary"
    );
    let expected = fx.engine.dictionary_payload(&name).unwrap().unwrap();
    assert_eq!(
        response.headers().get("content-length").unwrap(),
        &expected.len().to_string()
    );

    let body = body_bytes(response).await;
    assert_eq!(body, expected);
    assert!(body.starts_with(current.header.as_ref()));
}

#[tokio::test]
async fn unknown_dictionary_name_is_404() {
    let fx = fixture(false, Vec::new()).await;
    seed_dictionary(&fx.engine);

    let request = Request::builder()
        .uri(format!("/_dictionary/origin.test:8080/{}", "0".repeat(64)))
        .body(Body::empty())
        .unwrap();
    let response = fx.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn foreign_origin_segment_is_404() {
    let fx = fixture(false, Vec::new()).await;
    seed_dictionary(&fx.engine);
    let name = fx.engine.current().unwrap().name();

    let request = Request::builder()
        .uri(format!("/_dictionary/elsewhere.test:9999/{name}"))
        .body(Body::empty())
        .unwrap();
    let response = fx.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gzip_origin_is_inflated_before_encoding() {
    let fx = fixture(true, b"tiny delta".to_vec()).await;
    seed_dictionary(&fx.engine);
    let current = fx.engine.current().unwrap();

    // Without sdch the gzip bytes pass through untouched.
    let request = Request::builder()
        .uri("/page")
        .body(Body::empty())
        .unwrap();
    let response = fx.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers().get(CONTENT_ENCODING).unwrap(), "gzip");
    assert_eq!(body_bytes(response).await.as_ref(), origin_bytes(true));

    // With the dictionary, the delta replaces the gzip encoding.
    let request = Request::builder()
        .uri("/page")
        .header("accept-encoding", "sdch")
        .header("avail-dictionary", current.hash.client_id())
        .body(Body::empty())
        .unwrap();
    let response = fx.router.oneshot(request).await.unwrap();
    assert_eq!(response.headers().get(CONTENT_ENCODING).unwrap(), "sdch");
    let body = body_bytes(response).await;
    assert_eq!(&body[..8], current.hash.server_id().as_bytes());
}

#[tokio::test]
async fn responses_feed_the_ingest_queue() {
    let base = spawn_origin(false).await;
    let engine = Arc::new(Engine::new(
        EngineConfig {
            domain: "origin.test".to_string(),
            port: 8080,
        },
        Arc::new(MemoryChunkStore::new()),
        Arc::new(MemoryDictStore::new()),
        Arc::new(FixedCodec::new(Vec::new(), Vec::new())),
    ));
    let queue = IngestQueue::new(16);
    let state = Arc::new(ProxyState {
        engine,
        queue: queue.clone(),
        upstream: UpstreamClient::new(base.parse().unwrap()),
        config: ProxyConfig::default(),
    });
    let router = build_router(state);

    let request = Request::builder().uri("/page").body(Body::empty()).unwrap();
    router.oneshot(request).await.unwrap();

    let queued = queue.pop().await.unwrap();
    assert_eq!(queued.as_ref(), ORIGIN_BODY);
}

#[tokio::test(flavor = "multi_thread")]
async fn end_to_end_learning_loop() {
    let base = spawn_origin(false).await;
    let engine = Arc::new(Engine::new(
        EngineConfig {
            domain: "origin.test".to_string(),
            port: 8080,
        },
        Arc::new(MemoryChunkStore::new()),
        Arc::new(MemoryDictStore::new()),
        Arc::new(FixedCodec::new(b"d".to_vec(), Vec::new())),
    ));
    let queue = IngestQueue::new(16);
    let workers = sdax_engine::queue::spawn_workers(engine.clone(), queue.clone(), 2);
    let state = Arc::new(ProxyState {
        engine: engine.clone(),
        queue: queue.clone(),
        upstream: UpstreamClient::new(base.parse().unwrap()),
        config: ProxyConfig::default(),
    });
    let router = build_router(state);

    // First request: no dictionary yet; the body seeds the engine.
    let request = Request::builder().uri("/page").body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert!(response.headers().get("get-dictionary").is_none());

    // Wait for the background ingest to publish a dictionary.
    let mut tries = 0;
    while engine.current().is_none() {
        tries += 1;
        assert!(tries < 500, "dictionary never published");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    // Second request now advertises the download URL.
    let request = Request::builder().uri("/page").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert!(response.headers().get("get-dictionary").is_some());

    queue.close();
    for worker in workers {
        worker.await.unwrap();
    }
}

#[tokio::test]
async fn non_gated_content_type_is_untouched() {
    use axum::routing::get;

    // Origin serving JSON.
    let app = Router::new().route(
        "/data",
        get(|| async {
            let mut response = axum::response::Response::new(Body::from("{\"k\":1}"));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, "application/json".parse().unwrap());
            response
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let engine = Arc::new(Engine::new(
        EngineConfig {
            domain: "origin.test".to_string(),
            port: 8080,
        },
        Arc::new(MemoryChunkStore::new()),
        Arc::new(MemoryDictStore::new()),
        Arc::new(FixedCodec::new(b"d".to_vec(), Vec::new())),
    ));
    seed_dictionary(&engine);
    let current = engine.current().unwrap();
    let queue = IngestQueue::new(16);
    let state = Arc::new(ProxyState {
        engine: engine.clone(),
        queue: queue.clone(),
        upstream: UpstreamClient::new(format!("http://{addr}").parse().unwrap()),
        config: ProxyConfig::default(),
    });
    let router = build_router(state);

    let request = Request::builder()
        .uri("/data")
        .header("accept-encoding", "sdch")
        .header("avail-dictionary", current.hash.client_id())
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert!(response.headers().get(CONTENT_ENCODING).is_none());
    assert_eq!(body_bytes(response).await.as_ref(), b"{\"k\":1}");
    assert!(queue.is_empty());
}
