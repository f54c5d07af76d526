use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use cleaner::ports::{
    ArtifactDeleter, DigestResolution, DigestResolver, InventoryFetcher, ManifestCoordinates,
};
use cloudsmith::CloudsmithClient;
use common::config::RegistryConfig;
use serde_json::json;
use tokio::net::TcpListener;

/// Start `app` on an ephemeral local port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base_url: &str) -> CloudsmithClient {
    CloudsmithClient::new(&RegistryConfig {
        api_url: format!("{base_url}/v1/"),
        docker_registry: base_url.to_string(),
        owner: "acme".to_string(),
        repo: "releases".to_string(),
        page_size: 2,
        username: "bot".to_string(),
        api_key: "secret".to_string(),
        ..Default::default()
    })
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn coordinates(digest: &str) -> ManifestCoordinates {
    ManifestCoordinates {
        namespace: "acme".to_string(),
        repository: "releases".to_string(),
        name: "app".to_string(),
        digest: digest.to_string(),
    }
}

#[tokio::test]
async fn test_fetch_all_follows_page_total() {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();
    let app = Router::new().route(
        "/v1/packages/acme/releases/",
        get(
            move |Query(params): Query<HashMap<String, String>>, headers: HeaderMap| {
                let seen = seen.clone();
                async move {
                    let page = params["page"].clone();
                    seen.lock()
                        .unwrap()
                        .push((params, header(&headers, "x-api-key")));
                    (
                        [("x-pagination-pagetotal", "3")],
                        Json(json!([
                            {"identifier_perm": format!("p{page}-a")},
                            {"identifier_perm": format!("p{page}-b")}
                        ])),
                    )
                }
            },
        ),
    );
    let client = client(&serve(app).await);

    let records = client.fetch_all("tag:snapshot").await.unwrap();

    let identifiers: Vec<_> = records
        .iter()
        .map(|record| record["identifier_perm"].as_str().unwrap())
        .collect();
    assert_eq!(
        identifiers,
        vec!["p1-a", "p1-b", "p2-a", "p2-b", "p3-a", "p3-b"]
    );

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 3, "stops after the last page");
    for (index, (params, api_key)) in requests.iter().enumerate() {
        assert_eq!(params["page"], (index + 1).to_string());
        assert_eq!(params["page_size"], "2");
        assert_eq!(params["query"], "tag:snapshot");
        assert_eq!(api_key.as_deref(), Some("secret"));
    }
}

#[tokio::test]
async fn test_fetch_all_without_page_total_reads_one_page() {
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/v1/packages/acme/releases/",
        get(move || {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                Json(json!([{"identifier_perm": "only"}]))
            }
        }),
    );
    let client = client(&serve(app).await);

    let records = client.fetch_all("").await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_fetch_all_fails_on_error_status() {
    let app = Router::new().route(
        "/v1/packages/acme/releases/",
        get(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
    );
    let client = client(&serve(app).await);

    let err = client.fetch_all("").await.unwrap_err();

    assert!(format!("{err:#}").contains("401"));
}

#[tokio::test]
async fn test_manifest_lookup() {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();
    let app = Router::new().route(
        "/v2/acme/releases/app/manifests/:reference",
        get(move |Path(reference): Path<String>, headers: HeaderMap| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push((
                    header(&headers, "authorization"),
                    header(&headers, "accept"),
                ));
                match reference.as_str() {
                    "sha256:aaa" => Json(json!({
                        "schemaVersion": 2,
                        "manifests": [
                            {"digest": "sha256:bbb"},
                            {"digest": "sha256:ccc"}
                        ]
                    }))
                    .into_response(),
                    "sha256:eee" => (StatusCode::OK, "OK").into_response(),
                    "sha256:fff" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                    _ => StatusCode::NOT_FOUND.into_response(),
                }
            }
        }),
    );
    let client = client(&serve(app).await);

    assert_eq!(
        client
            .list_manifest_digests(&coordinates("aaa"))
            .await
            .unwrap(),
        DigestResolution::Found(vec!["bbb".to_string(), "ccc".to_string()])
    );
    assert_eq!(
        client
            .list_manifest_digests(&coordinates("ddd"))
            .await
            .unwrap(),
        DigestResolution::NotFound
    );
    assert_eq!(
        client
            .list_manifest_digests(&coordinates("eee"))
            .await
            .unwrap(),
        DigestResolution::Found(vec![]),
        "a body that is not a manifest has no children"
    );

    let err = client
        .list_manifest_digests(&coordinates("fff"))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("500"));

    for (authorization, accept) in requests.lock().unwrap().iter() {
        // base64("bot:secret")
        assert_eq!(authorization.as_deref(), Some("Basic Ym90OnNlY3JldA=="));
        assert_eq!(
            accept.as_deref(),
            Some("application/vnd.docker.distribution.manifest.list.v2+json")
        );
    }
}

#[tokio::test]
async fn test_delete_reports_rejections() {
    let deleted = Arc::new(Mutex::new(Vec::new()));
    let seen = deleted.clone();
    let app = Router::new().route(
        "/v1/packages/acme/releases/:identifier/",
        delete(move |Path(identifier): Path<String>, headers: HeaderMap| {
            let seen = seen.clone();
            async move {
                if header(&headers, "x-api-key").as_deref() != Some("secret") {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                if identifier == "locked" {
                    return (StatusCode::FORBIDDEN, r#"{"detail":"locked"}"#).into_response();
                }
                seen.lock().unwrap().push(identifier);
                StatusCode::NO_CONTENT.into_response()
            }
        }),
    );
    let client = client(&serve(app).await);

    client.delete("Xy12AbC").await.unwrap();
    let failure = client.delete("locked").await.unwrap_err();

    assert_eq!(failure.status, Some(403));
    assert_eq!(failure.details, r#"{"detail":"locked"}"#);
    assert_eq!(*deleted.lock().unwrap(), vec!["Xy12AbC".to_string()]);
}
