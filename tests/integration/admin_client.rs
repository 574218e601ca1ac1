//! Integration tests for the Synapse admin API client against a mock server

use std::time::Duration;
use synapse_janitor::admin::{DeleteRoomRequest, RoomAdminApi, SynapseAdminClient};
use synapse_janitor::error::AdminApiError;
use synapse_janitor::purge::{reconcile, Status};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOM: &str = "!abc:example.org";
const TOKEN: &str = "syt_admin_token";

fn client(server: &MockServer) -> SynapseAdminClient {
    SynapseAdminClient::new(&server.uri(), TOKEN, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_delete_room_posts_purge_request() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/_synapse/admin/v2/rooms/!abc:example.org"))
        .and(header("authorization", "Bearer syt_admin_token"))
        .and(body_json(serde_json::json!({
            "block": true,
            "force_purge": true,
            "purge": true,
            "message": "bye"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "delete_id": "abcdef" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let delete_id = client(&server)
        .delete_room(ROOM, &DeleteRoomRequest::purge(true, "bye"))
        .await
        .unwrap();
    assert_eq!(delete_id, "abcdef");
}

#[tokio::test]
async fn test_delete_room_error_status_keeps_body_but_not_token() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(400).set_body_string("{\"errcode\":\"M_UNKNOWN\"}"))
        .mount(&server)
        .await;

    let err = client(&server)
        .delete_room(ROOM, &DeleteRoomRequest::purge(false, "bye"))
        .await
        .unwrap_err();

    match &err {
        AdminApiError::Status { status, body, room_id, .. } => {
            assert_eq!(*status, 400);
            assert!(body.contains("M_UNKNOWN"));
            assert_eq!(room_id, ROOM);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!err.to_string().contains(TOKEN));
}

#[tokio::test]
async fn test_delete_status_parses_every_shard() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_synapse/admin/v2/rooms/!abc:example.org/delete_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [
                {
                    "delete_id": "abcdef",
                    "status": "purging",
                    "shutdown_room": {
                        "kicked_users": ["@alice:example.org"],
                        "failed_to_kick_users": [],
                        "local_aliases": ["#abc:example.org"],
                        "new_room_id": null
                    }
                },
                { "delete_id": "abcdef", "status": "complete" }
            ]
        })))
        .mount(&server)
        .await;

    let shards = client(&server).delete_status(ROOM).await.unwrap();
    assert_eq!(shards.len(), 2);
    assert_eq!(shards[0].shutdown_room.local_aliases, vec!["#abc:example.org"]);

    let reconciled = reconcile(&shards).unwrap();
    assert_eq!(reconciled.status, Status::Complete);
    assert_eq!(reconciled.affected_users, vec!["@alice:example.org"]);
}

#[tokio::test]
async fn test_malformed_status_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client(&server).delete_status(ROOM).await.unwrap_err();
    assert!(matches!(err, AdminApiError::Decode { .. }));
}

#[tokio::test]
async fn test_room_name_prefers_canonical_alias() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_synapse/admin/v1/rooms/!abc:example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "room_id": ROOM,
            "name": "Big Room",
            "canonical_alias": "#big:example.org"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_synapse/admin/v1/rooms/!named:example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "Only a name",
            "canonical_alias": null
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(
        client.room_name(ROOM).await.unwrap().as_deref(),
        Some("#big:example.org")
    );
    assert_eq!(
        client.room_name("!named:example.org").await.unwrap().as_deref(),
        Some("Only a name")
    );
}

#[tokio::test]
async fn test_unknown_room_has_no_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert_eq!(client(&server).room_name(ROOM).await.unwrap(), None);
}

#[tokio::test]
async fn test_unreachable_server_is_a_request_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = SynapseAdminClient::new(&uri, TOKEN, Duration::from_millis(500)).unwrap();
    let err = client.delete_status(ROOM).await.unwrap_err();
    assert!(matches!(err, AdminApiError::Request { .. }));
}
