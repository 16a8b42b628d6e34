mod common;

use std::time::Duration;

use http::StatusCode;
use room_api::broker::{Broker, Topic, TopicEvent};
use tokio::time;

use common::{bearer, create_room, new_user_id, TestEnv};

async fn invite(server: &axum_test::TestServer, host: &str, room_id: &str, target: &str) -> axum_test::TestResponse {
    let (name, value) = bearer(host);
    server
        .post(&format!("/api/v1/rooms/{room_id}/invitations"))
        .add_header(name, value)
        .json(&serde_json::json!({ "user_id": target }))
        .await
}

#[tokio::test]
async fn invite_accept_enters_the_room() {
    let env = TestEnv::new();
    let server = env.server();
    let (host, friend) = (new_user_id(), new_user_id());
    let room_id = create_room(&server, &env, &host, 8).await;

    let resp = invite(&server, &host, &room_id, &friend).await;
    resp.assert_status(StatusCode::CREATED);
    let invitation: serde_json::Value = resp.json();
    assert!(invitation["id"].as_str().unwrap().starts_with("inv_"));
    assert_eq!(invitation["status"], "PENDING");
    assert_eq!(invitation["sender_id"], host);
    assert_eq!(invitation["receiver_id"], friend);
    let invitation_id = invitation["id"].as_str().unwrap().to_string();

    let (name, value) = bearer(&friend);
    let resp = server
        .get("/api/v1/invitations/received")
        .add_header(name.clone(), value.clone())
        .await;
    resp.assert_status_ok();
    let received: Vec<serde_json::Value> = resp.json();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["id"], invitation_id);

    let resp = server
        .post(&format!("/api/v1/invitations/{invitation_id}/accept"))
        .add_header(name.clone(), value.clone())
        .await;
    resp.assert_status_ok();
    let participant: serde_json::Value = resp.json();
    assert_eq!(participant["room_id"], room_id);
    assert_eq!(participant["user_id"], friend);
    assert_eq!(participant["connection_status"], "ACTIVE");

    // Already consumed.
    let resp = server
        .post(&format!("/api/v1/invitations/{invitation_id}/accept"))
        .add_header(name, value)
        .await;
    resp.assert_status(StatusCode::GONE);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "INVITATION_EXPIRED");

    let (name, value) = bearer(&host);
    let sent: Vec<serde_json::Value> = server
        .get("/api/v1/invitations/sent")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["status"], "ACCEPTED");
}

#[tokio::test]
async fn duplicate_pending_invite_conflicts() {
    let env = TestEnv::new();
    let server = env.server();
    let (host, friend) = (new_user_id(), new_user_id());
    let room_id = create_room(&server, &env, &host, 8).await;

    invite(&server, &host, &room_id, &friend)
        .await
        .assert_status(StatusCode::CREATED);
    let resp = invite(&server, &host, &room_id, &friend).await;
    resp.assert_status(StatusCode::CONFLICT);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "ALREADY_INVITED");
}

#[tokio::test]
async fn only_host_invites_and_only_receiver_answers() {
    let env = TestEnv::new();
    let server = env.server();
    let (host, guest, friend, stranger) = (new_user_id(), new_user_id(), new_user_id(), new_user_id());
    let room_id = create_room(&server, &env, &host, 8).await;

    let resp = invite(&server, &guest, &room_id, &friend).await;
    resp.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "NOT_HOST");

    let invitation: serde_json::Value = invite(&server, &host, &room_id, &friend).await.json();
    let invitation_id = invitation["id"].as_str().unwrap();

    let (name, value) = bearer(&stranger);
    let resp = server
        .post(&format!("/api/v1/invitations/{invitation_id}/reject"))
        .add_header(name, value)
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "NOT_YOUR_INVITATION");

    let (name, value) = bearer(&friend);
    let resp = server
        .post(&format!("/api/v1/invitations/{invitation_id}/reject"))
        .add_header(name, value)
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["status"], "REJECTED");

    let (name, value) = bearer(&friend);
    let resp = server
        .post("/api/v1/invitations/inv_missing/accept")
        .add_header(name, value)
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "INVITATION_NOT_FOUND");
}

#[tokio::test]
async fn no_invites_while_playing() {
    let env = TestEnv::new();
    let server = env.server();
    let (host, friend) = (new_user_id(), new_user_id());
    let room_id = create_room(&server, &env, &host, 8).await;

    let (name, value) = bearer(&host);
    server
        .post(&format!("/api/v1/rooms/{room_id}/start"))
        .add_header(name, value)
        .await
        .assert_status_ok();

    let resp = invite(&server, &host, &room_id, &friend).await;
    resp.assert_status(StatusCode::CONFLICT);
    assert_eq!(
        resp.json::<serde_json::Value>()["error"]["code"],
        "INVITATION_NOT_ALLOWED_PLAYING"
    );
}

#[tokio::test]
async fn accepted_invitation_still_obeys_capacity() {
    let env = TestEnv::new();
    let server = env.server();
    let (host, friend, walk_in) = (new_user_id(), new_user_id(), new_user_id());
    let room_id = create_room(&server, &env, &host, 2).await;

    let invitation: serde_json::Value = invite(&server, &host, &room_id, &friend).await.json();
    let invitation_id = invitation["id"].as_str().unwrap();

    // The last seat goes to someone else first.
    let (name, value) = bearer(&walk_in);
    server
        .post(&format!("/api/v1/rooms/{room_id}/enter"))
        .add_header(name, value)
        .await
        .assert_status_ok();

    let (name, value) = bearer(&friend);
    let resp = server
        .post(&format!("/api/v1/invitations/{invitation_id}/accept"))
        .add_header(name, value)
        .await;
    resp.assert_status(StatusCode::CONFLICT);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "ROOM_IS_FULL");

    let resp = invite(&server, &host, &room_id, &new_user_id()).await;
    assert_eq!(
        resp.json::<serde_json::Value>()["error"]["code"],
        "INVITATION_NOT_ALLOWED_FULL"
    );
}

#[tokio::test]
async fn receiver_is_notified_on_their_private_topic() {
    let env = TestEnv::new();
    let server = env.server();
    let (host, friend) = (new_user_id(), new_user_id());
    let room_id = create_room(&server, &env, &host, 8).await;
    let mut rx = env.broker.subscribe_topic(Topic::user_notification(&friend));

    invite(&server, &host, &room_id, &friend)
        .await
        .assert_status(StatusCode::CREATED);

    let payload = time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timeout waiting for notification")
        .expect("channel closed");
    let event: TopicEvent = serde_json::from_str(&payload).unwrap();
    assert_eq!(event.event, "INVITATION_RECEIVED");
    assert_eq!(event.data["room_id"], room_id);
}
