//! The API client against the real router on an ephemeral port

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;

use tasker::api::{router, Client, ClientConfig, ClientError};
use tasker::models::{TaskId, TaskNode};
use tasker::service::{FixedClock, Service, ServiceConfig};
use tasker::store::MemoryStore;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 23, 19, 0, 0).unwrap()
}

async fn spawn_server() -> (MemoryStore, Client) {
    let store = MemoryStore::example(now()).unwrap();
    let service = Service::with_clock(
        Arc::new(store.clone()),
        ServiceConfig::default(),
        Arc::new(FixedClock(now())),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(service)).await.unwrap();
    });

    let client = Client::with_config(ClientConfig {
        base_url: format!("http://{}", address),
    });
    (store, client)
}

#[tokio::test]
async fn test_reschedule() {
    let (store, client) = spawn_server().await;

    let response = client.reschedule(1, None).await.unwrap();
    let ids: Vec<TaskId> = response.scheduled.iter().map(TaskNode::id).collect();
    assert_eq!(ids, vec![6, 1, 2, 3, 4]);
    assert_eq!(response.overdue_ids, vec![4]);
    assert_eq!(store.get(1).await.unwrap().planned_start(), Some(now() + Duration::hours(2)));

    let anchor = now() + Duration::days(1);
    let response = client.reschedule(1, Some(anchor)).await.unwrap();
    assert_eq!(response.scheduled[0].planned_start(), Some(anchor));
}

#[tokio::test]
async fn test_tree_mutations() {
    let (store, client) = spawn_server().await;

    let moved = client.attach(2, 6).await.unwrap();
    assert_eq!(moved.id(), 6);
    assert_eq!(moved.parent_id(), Some(2));

    let tree = client.subtree(1).await.unwrap();
    assert_eq!(tree.len(), 5);

    assert!(client.detach(2, 6).await.unwrap());
    assert!(!client.detach(2, 6).await.unwrap());
    assert!(store.get(6).await.unwrap().is_root());

    assert_eq!(client.delete_task(3).await.unwrap(), vec![4, 3]);
    assert!(store.get(4).await.is_none());
}

#[tokio::test]
async fn test_errors_carry_the_server_message() {
    let (_store, client) = spawn_server().await;

    match client.attach(4, 1).await {
        Err(ClientError::Api(message)) => assert!(message.contains("cycle")),
        other => panic!("unexpected result: {other:?}"),
    }
    match client.subtree(99).await {
        Err(ClientError::Api(message)) => assert!(message.contains("99")),
        other => panic!("unexpected result: {other:?}"),
    }
}
