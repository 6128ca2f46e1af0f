mod support;

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use support::{assert_silent, next_event, send_json, user, TestServer};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn like_reaches_every_device_of_online_followers() {
    let server = TestServer::start(false).await;
    let (owner, fan, stranger) = (user(), user(), user());
    server.graph.follow(fan, owner);

    let mut owner_ws = server.connect(owner).await;
    let mut fan_phone = server.connect(fan).await;
    let mut fan_laptop = server.connect(fan).await;
    let mut stranger_ws = server.connect(stranger).await;

    send_json(
        &mut stranger_ws,
        json!({ "event": "likePost", "data": { "owner_id": owner, "post": { "id": "p1" } } }),
    )
    .await;

    for ws in [&mut owner_ws, &mut fan_phone, &mut fan_laptop] {
        let frame = next_event(ws, "likeToClient").await;
        assert_eq!(frame["actor_id"], json!(stranger));
        assert_eq!(frame["data"]["post"], json!({ "id": "p1" }));
    }
    assert_silent(&mut stranger_ws).await;
    assert_eq!(server.notifications.count_for(owner), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn follow_reaches_only_the_target() {
    let server = TestServer::start(false).await;
    let (actor, target, bystander) = (user(), user(), user());
    server.graph.follow(bystander, target);

    let mut actor_ws = server.connect(actor).await;
    let mut target_ws = server.connect(target).await;
    let mut bystander_ws = server.connect(bystander).await;

    send_json(
        &mut actor_ws,
        json!({ "event": "follow", "data": { "target_id": target } }),
    )
    .await;

    let frame = next_event(&mut target_ws, "followToClient").await;
    assert_eq!(frame["actor_id"], json!(actor));
    assert_silent(&mut bystander_ws).await;
    assert_silent(&mut actor_ws).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn notification_for_offline_user_is_stored_and_listed() {
    let server = TestServer::start(false).await;
    let (sender, recipient) = (user(), user());
    let mut sender_ws = server.connect(sender).await;

    send_json(
        &mut sender_ws,
        json!({
            "event": "createNotify",
            "data": { "recipient_id": recipient, "text": "liked your post", "url": "/p/1" }
        }),
    )
    .await;

    // 等待离线补偿完成
    for _ in 0..20 {
        if server.notifications.count_for(recipient) > 0 {
            break;
        }
        sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(server.notifications.count_for(recipient), 1);

    let client = Client::new();
    let token = server.token(recipient);
    let inbox: Vec<Value> = client
        .get(server.http("/api/v1/notifications?limit=10"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("list notifications")
        .json()
        .await
        .expect("json");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["payload"]["text"], "liked your post");
    assert_eq!(inbox[0]["is_read"], false);

    let marked: Value = client
        .post(server.http("/api/v1/notifications/read"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("mark read")
        .json()
        .await
        .expect("json");
    assert_eq!(marked["updated"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn online_and_offline_notices_follow_last_session() {
    let server = TestServer::start(true).await;
    let (star, fan) = (user(), user());
    server.graph.follow(fan, star);

    let mut fan_ws = server.connect(fan).await;
    let mut star_phone = server.connect(star).await;
    let frame = next_event(&mut fan_ws, "userOnlineToClient").await;
    assert_eq!(frame["data"]["user_id"], json!(star));

    let mut star_laptop = server.connect(star).await;
    assert_silent(&mut fan_ws).await;

    star_phone.close(None).await.expect("close phone");
    assert_silent(&mut fan_ws).await;

    star_laptop.close(None).await.expect("close laptop");
    let frame = next_event(&mut fan_ws, "userOfflineToClient").await;
    assert_eq!(frame["data"]["online"], false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn check_user_online_defaults_to_following() {
    let server = TestServer::start(false).await;
    let (me, online_friend, offline_friend) = (user(), user(), user());
    server.graph.follow(me, online_friend);
    server.graph.follow(me, offline_friend);

    let _friend_ws = server.connect(online_friend).await;
    let mut me_ws = server.connect(me).await;

    send_json(&mut me_ws, json!({ "event": "checkUserOnline" })).await;
    let frame = next_event(&mut me_ws, "checkUserOnlineToMe").await;
    assert_eq!(frame["data"]["online_ids"], json!([online_friend]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_frame_gets_error_reply() {
    let server = TestServer::start(false).await;
    let mut ws = server.connect(user()).await;

    send_json(&mut ws, json!({ "event": "dance", "data": {} })).await;
    let frame = next_event(&mut ws, "error").await;
    assert!(frame["data"]["message"].as_str().unwrap().contains("dance"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn websocket_rejects_invalid_token() {
    let server = TestServer::start(false).await;
    let url = format!("ws://{}/api/v1/ws?token=forged", server.addr);

    match connect_async(url).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 401);
        }
        other => panic!("expected 401, got {:?}", other.map(|(_, response)| response.status())),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_endpoint_dispatches_for_authenticated_actor() {
    let server = TestServer::start(false).await;
    let (actor, owner, other) = (user(), user(), user());
    let mut owner_ws = server.connect(owner).await;
    let client = Client::new();

    let event = json!({
        "kind": "comment_created",
        "actor_id": actor,
        "subject_owner_id": owner,
        "payload": { "text": "nice" }
    });

    let response = client
        .post(server.http("/api/v1/events"))
        .bearer_auth(server.token(other))
        .json(&event)
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .post(server.http("/api/v1/events"))
        .json(&event)
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let report: Value = client
        .post(server.http("/api/v1/events"))
        .bearer_auth(server.token(actor))
        .json(&event)
        .send()
        .await
        .expect("send")
        .json()
        .await
        .expect("json");
    assert_eq!(report["delivered"], 1);
    assert_eq!(report["persisted"], 0);

    let frame = next_event(&mut owner_ws, "createCommentToClient").await;
    assert_eq!(frame["data"]["text"], "nice");

    let malformed = json!({ "kind": "like", "actor_id": actor, "payload": {} });
    let response = client
        .post(server.http("/api/v1/events"))
        .bearer_auth(server.token(actor))
        .json(&malformed)
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn presence_online_returns_connected_subset() {
    let server = TestServer::start(false).await;
    let (a, b, c) = (user(), user(), user());
    let _a_ws = server.connect(a).await;

    let body: Value = Client::new()
        .post(server.http("/api/v1/presence/online"))
        .bearer_auth(server.token(c))
        .json(&json!({ "ids": [a, b] }))
        .send()
        .await
        .expect("send")
        .json()
        .await
        .expect("json");

    assert_eq!(body["online_ids"], json!([a]));
}
