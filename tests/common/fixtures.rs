//! Catalog fixtures served through wiremock

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Descriptor JSON for a media item whose bytes live under `media/`
pub fn media_descriptor(kind: &str, id: &str, body: &[u8]) -> Value {
    json!({
        "kind": kind,
        "id": id,
        "title": format!("{} {}", kind, id),
        "byte_size": body.len(),
        "url": format!("media/{}_{}", kind, id),
    })
}

/// Serve a media item: its descriptor and its bytes
pub async fn mount_media(server: &MockServer, kind: &str, id: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/api/content/{}/{}", kind, id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(media_descriptor(kind, id, body)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/media/{}_{}", kind, id)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Accept every mutation posted to the sync endpoint
pub async fn mount_sync_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "ack" })))
        .mount(server)
        .await;
}

/// Bodies of every mutation the server received, in arrival order
pub async fn received_mutations(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == "/api/sync")
        .map(|r| serde_json::from_slice(&r.body).expect("mutation body is JSON"))
        .collect()
}
