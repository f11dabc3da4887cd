use std::time::Duration;

use mockito::Matcher;
use shopbot_core::social::{EventKind, PostRequest, SocialClient, SocialError, Visibility};

use crate::types::Notification;
use crate::MastodonClient;

fn client(server: &mockito::Server) -> MastodonClient {
    MastodonClient::new(&server.url(), "tok", Duration::from_secs(5)).unwrap()
}

const MENTION: &str = r#"[
  {
    "id": "42",
    "type": "mention",
    "created_at": "2026-03-01T12:00:00.000Z",
    "account": {"id": "7", "username": "hana", "acct": "hana@other.social", "display_name": "하나"},
    "status": {
      "id": "1001",
      "created_at": "2026-03-01T12:00:00.000Z",
      "content": "<p><span class=\"h-card\"><a href=\"https://ex.social/@shop\">@<span>shop</span></a></span> [구매/사과/2개]</p>",
      "visibility": "unlisted",
      "url": "https://other.social/@hana/1001",
      "mentions": [{"id": "1", "acct": "shop"}, {"id": "9", "acct": "duri"}]
    }
  },
  {
    "id": "41",
    "type": "admin.sign_up",
    "account": {"id": "8", "username": "new", "acct": "new", "display_name": ""}
  }
]"#;

#[test]
fn unknown_notification_types_deserialize() {
    let parsed: Vec<Notification> = serde_json::from_str(MENTION).unwrap();
    assert_eq!(parsed.len(), 2);
    assert!(parsed[0].created_at.is_some());
}

#[tokio::test]
async fn polls_mentions_and_converts() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/notifications")
        .match_header("authorization", "Bearer tok")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "20".into()),
            Matcher::UrlEncoded("types[]".into(), "mention".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(MENTION)
        .create_async()
        .await;

    let events = client(&server).poll_notifications(20, None).await.unwrap();
    mock.assert_async().await;

    assert_eq!(events.len(), 2);
    let first = &events[0];
    assert_eq!(first.kind, EventKind::Mention);
    assert_eq!(first.account.acct, "hana@other.social");
    let status = first.status.as_ref().unwrap();
    assert_eq!(status.text, "@shop [구매/사과/2개]");
    assert_eq!(status.visibility, Visibility::Unlisted);
    assert_eq!(status.mentions, vec!["shop", "duri"]);

    assert!(matches!(events[1].kind, EventKind::Other(_)));
    assert_eq!(events[1].account.display_name, "new");
}

#[tokio::test]
async fn polls_from_last_seen_id() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/notifications")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "20".into()),
            Matcher::UrlEncoded("since_id".into(), "41".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let events = client(&server).poll_notifications(20, Some("41")).await.unwrap();
    mock.assert_async().await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn posts_threaded_reply() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/statuses")
        .match_body(Matcher::PartialJsonString(
            r#"{"status":"@hana 완료","visibility":"direct","in_reply_to_id":"1001"}"#.into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"2002","content":"<p>@hana 완료</p>","visibility":"direct","url":"https://ex.social/@shop/2002"}"#)
        .create_async()
        .await;

    let posted = client(&server)
        .post_message(&PostRequest {
            text: "@hana 완료".into(),
            visibility: Visibility::Direct,
            in_reply_to: Some("1001".into()),
        })
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(posted.id, "2002");
    assert_eq!(posted.url.as_deref(), Some("https://ex.social/@shop/2002"));
}

#[tokio::test]
async fn verify_credentials_maps_account() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/v1/accounts/verify_credentials")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"1","username":"shop","acct":"shop","display_name":"상점","note":"..."}"#)
        .create_async()
        .await;

    let me = client(&server).account_info().await.unwrap();
    assert_eq!(me.acct, "shop");
    assert_eq!(me.display_name, "상점");
}

#[tokio::test]
async fn status_codes_map_to_social_errors() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/v1/statuses")
        .with_status(422)
        .with_body(r#"{"error":"Validation failed: Text character limit of 500 exceeded"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/v1/notifications")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("upstream down")
        .create_async()
        .await;
    server
        .mock("GET", "/api/v1/accounts/verify_credentials")
        .with_status(429)
        .with_body("rate limited")
        .create_async()
        .await;

    let c = client(&server);
    let err = c
        .post_message(&PostRequest {
            text: "x".into(),
            visibility: Visibility::Public,
            in_reply_to: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SocialError::Rejected { status: 422, .. }));
    assert!(!err.is_retryable());

    let err = c.poll_notifications(5, None).await.unwrap_err();
    assert!(matches!(err, SocialError::Unavailable(_)));
    assert!(err.is_retryable());

    let err = c.account_info().await.unwrap_err();
    assert!(matches!(err, SocialError::Rejected { status: 429, .. }));
    assert!(err.is_retryable());
}

#[test]
fn rejects_unusable_base_url() {
    assert!(MastodonClient::new("not a url", "t", Duration::from_secs(1)).is_err());
    assert!(MastodonClient::new("mailto:x@y", "t", Duration::from_secs(1)).is_err());
}
