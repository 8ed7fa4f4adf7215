use docs_sync::upload::{ApiKey, ReadmeClient, API_KEY_ENV};
use docs_sync_core::contract::{DocPage, DocsHost};
use docs_sync_core::PublishError;
use serial_test::serial;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page(slug: &str) -> DocPage {
    DocPage {
        slug: slug.to_string(),
        title: "Amazon Bedrock".to_string(),
        body: "# Module converse\n".to_string(),
        category: Some("6249a41de5d2d5001a4b8cde".to_string()),
        category_slug: None,
        parent_doc: None,
        excerpt: Some("Amazon Bedrock integration for Haystack".to_string()),
        hidden: false,
        order: Some(9),
        content_hash: "abc123".to_string(),
    }
}

fn client(server: &MockServer) -> ReadmeClient {
    ReadmeClient::new(server.uri(), Some(ApiKey::new("rdme_test_key"))).unwrap()
}

#[tokio::test]
async fn test_get_doc_returns_none_on_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/docs/integrations-amazon-bedrock"))
        .and(header("x-readme-version", "2.0"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let doc = client(&server)
        .get_doc("integrations-amazon-bedrock", "2.0")
        .await
        .unwrap();
    assert!(doc.is_none());
}

#[tokio::test]
async fn test_get_doc_reads_stored_hash() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/docs/integrations-amazon-bedrock"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "slug": "integrations-amazon-bedrock",
            "title": "Amazon Bedrock",
            "lastUpdatedHash": "abc123",
            "body": "ignored"
        })))
        .mount(&server)
        .await;

    let doc = client(&server)
        .get_doc("integrations-amazon-bedrock", "2.0")
        .await
        .unwrap()
        .expect("doc should exist");
    assert_eq!(doc.title, "Amazon Bedrock");
    assert_eq!(doc.last_updated_hash.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_create_doc_posts_page_with_hash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/docs"))
        .and(header("x-readme-version", "2.0"))
        .and(body_partial_json(serde_json::json!({
            "slug": "integrations-amazon-bedrock",
            "title": "Amazon Bedrock",
            "category": "6249a41de5d2d5001a4b8cde",
            "order": 9,
            "hidden": false,
            "lastUpdatedHash": "abc123"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "slug": "integrations-amazon-bedrock",
            "title": "Amazon Bedrock",
            "lastUpdatedHash": "abc123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server)
        .create_doc(&page("integrations-amazon-bedrock"), "2.0")
        .await
        .unwrap();
    assert_eq!(created.slug, "integrations-amazon-bedrock");
}

#[tokio::test]
async fn test_update_doc_puts_to_slug() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/docs/integrations-amazon-bedrock"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "slug": "integrations-amazon-bedrock",
            "title": "Amazon Bedrock",
            "lastUpdatedHash": "abc123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let updated = client(&server)
        .update_doc(
            "integrations-amazon-bedrock",
            &page("integrations-amazon-bedrock"),
            "2.0",
        )
        .await
        .unwrap();
    assert_eq!(updated.last_updated_hash.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_unauthorized_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server).get_doc("anything", "2.0").await.unwrap_err();
    assert!(matches!(err, PublishError::Unauthorized { status: 401 }));
}

#[tokio::test]
async fn test_server_errors_carry_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("category is required"))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_doc(&page("x"), "2.0")
        .await
        .unwrap_err();
    match err {
        PublishError::Http { status, body, slug } => {
            assert_eq!(status, 400);
            assert_eq!(slug, "x");
            assert!(body.contains("category is required"));
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_key_fails_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = ReadmeClient::new(server.uri(), None).unwrap();
    let err = client.get_doc("x", "2.0").await.unwrap_err();
    assert!(matches!(err, PublishError::MissingCredential));
}

#[test]
#[serial]
fn test_api_key_from_env_ignores_blank_values() {
    std::env::set_var(API_KEY_ENV, "   ");
    assert!(ApiKey::from_env().is_none());

    std::env::set_var(API_KEY_ENV, "rdme_from_env");
    assert_eq!(ApiKey::from_env(), Some(ApiKey::new("rdme_from_env")));

    std::env::remove_var(API_KEY_ENV);
    assert!(ApiKey::from_env().is_none());
}
