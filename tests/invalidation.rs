// Integration tests for cache administration and refetch triggers

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use color_eyre::Result;
use querykit::prelude::*;
use querykit::transport::Response;
use querykit::transport::mock::{MockReply, MockTransport};
use serde_json::{Value, json};
use tokio::time::sleep;

async fn wait_for_calls(transport: &MockTransport, expected: usize) {
    for _ in 0..100 {
        if transport.call_count() >= expected {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected {expected} transport calls, saw {}",
        transport.call_count()
    );
}

fn users_transport() -> MockTransport {
    MockTransport::new().fallback(MockReply::ok(Response::ok(json!([{"id": 1}]))))
}

#[tokio::test(start_paused = true)]
async fn test_cached_data_expires_after_fresh_for() -> Result<()> {
    let client = Client::new(MockTransport::new());

    client.set_query_data("/users", json!([{"id": 1}]), Duration::from_millis(5000));

    sleep(Duration::from_millis(4999)).await;
    assert_eq!(client.get_query_data("/users"), Some(json!([{"id": 1}])));

    sleep(Duration::from_millis(1)).await;
    assert_eq!(client.get_query_data("/users"), None);
    assert!(client.cache().is_empty(), "expired entry is evicted on read");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_refetches_active_query() -> Result<()> {
    let transport = users_transport();
    let client = Client::new(transport.clone());

    let users = client.query::<Value>(
        "/users",
        QueryOptions::default().stale_time(Duration::from_secs(60)),
    )?;
    users.activate();
    wait_for_calls(&transport, 1).await;
    sleep(Duration::from_millis(10)).await;
    assert!(users.is_success());

    // Fresh data is served from the cache.
    users.refetch().await;
    assert_eq!(transport.call_count(), 1);

    client.invalidate_query("/users");
    wait_for_calls(&transport, 2).await;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(transport.call_count(), 2);
    assert!(users.is_success());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_ignores_other_keys() -> Result<()> {
    let transport = users_transport();
    let client = Client::new(transport.clone());

    let users = client.query::<Value>("/users", QueryOptions::default())?;
    users.activate();
    wait_for_calls(&transport, 1).await;

    client.invalidate_query("/posts");
    sleep(Duration::from_millis(50)).await;

    assert_eq!(transport.call_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_all_does_not_refetch() -> Result<()> {
    let transport = users_transport();
    let client = Client::new(transport.clone());

    let users = client.query::<Value>(
        "/users",
        QueryOptions::default().stale_time(Duration::from_secs(60)),
    )?;
    users.activate();
    wait_for_calls(&transport, 1).await;
    sleep(Duration::from_millis(10)).await;
    assert!(client.get_query_data("/users").is_some());

    client.invalidate_all();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(client.get_query_data("/users"), None);
    assert_eq!(transport.call_count(), 1);

    // The next run misses the cache.
    users.refetch().await;
    assert_eq!(transport.call_count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_query_invalidate_bypasses_fresh_cache() -> Result<()> {
    let transport = users_transport();
    let client = Client::new(transport.clone());

    let users = client.query::<Value>(
        "/users",
        QueryOptions::default().stale_time(Duration::from_secs(60)),
    )?;
    users.refetch().await;
    users.invalidate().await;

    assert_eq!(transport.call_count(), 2);
    assert!(client.get_query_data("/users").is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_focus_refetches_until_deactivated() -> Result<()> {
    let transport = users_transport();
    let client = Client::new(transport.clone());

    let users = client.query::<Value>(
        "/users",
        QueryOptions::default()
            .refetch_on_mount(false)
            .refetch_on_window_focus(true),
    )?;
    users.activate();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.call_count(), 0);

    client.notify_focus();
    wait_for_calls(&transport, 1).await;

    users.deactivate();
    assert!(!client.is_active("/users"));

    client.notify_focus();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.call_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_focus_ignored_when_disabled() -> Result<()> {
    let transport = users_transport();
    let client = Client::new(transport.clone());

    let users = client.query::<Value>(
        "/users",
        QueryOptions::default()
            .refetch_on_mount(false)
            .refetch_on_window_focus(false),
    )?;
    users.activate();

    client.notify_focus();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(transport.call_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_refetch_interval_polls_while_active() -> Result<()> {
    let transport = users_transport();
    let client = Client::new(transport.clone());

    let users = client.query::<Value>(
        "/users",
        QueryOptions::default()
            .refetch_on_mount(false)
            .refetch_interval(Duration::from_millis(100)),
    )?;
    users.activate();

    sleep(Duration::from_millis(250)).await;
    assert_eq!(transport.call_count(), 2);

    drop(users);
    sleep(Duration::from_millis(500)).await;
    assert_eq!(transport.call_count(), 2);
    assert!(client.active_keys().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_deactivate_cancels_in_flight_fetch() -> Result<()> {
    let transport = MockTransport::new()
        .push(MockReply::ok(Response::ok(json!([1]))).after(Duration::from_millis(100)));
    let client = Client::new(transport.clone());

    let numbers = client.query::<Vec<u32>>("/numbers", QueryOptions::default())?;
    numbers.activate();
    wait_for_calls(&transport, 1).await;
    assert!(numbers.is_loading());

    numbers.deactivate();
    sleep(Duration::from_millis(200)).await;

    assert!(!numbers.is_success());
    assert_eq!(numbers.data(), None);
    assert_eq!(numbers.error(), None);
    assert_eq!(client.get_query_data("/numbers"), None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_active_keys_track_consumers() -> Result<()> {
    let client = Client::new(users_transport());

    let a = client.query::<Value>("/users", QueryOptions::default().refetch_on_mount(false))?;
    let b = client.query::<Value>("/users", QueryOptions::default().refetch_on_mount(false))?;
    let c = client.query::<Value>("/posts", QueryOptions::default().refetch_on_mount(false))?;
    a.activate();
    b.activate();
    c.activate();

    assert_eq!(client.active_keys(), vec!["/posts".to_string(), "/users".to_string()]);

    a.deactivate();
    assert!(client.is_active("/users"), "second consumer keeps the key active");

    b.deactivate();
    c.deactivate();
    assert!(client.active_keys().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_still_refetches_on_invalidate() -> Result<()> {
    let transport = users_transport();
    let client = Client::new(transport.clone());

    let users = client.query::<Value>(
        "/users",
        QueryOptions::default()
            .refetch_on_mount(false)
            .refetch_interval(Duration::ZERO),
    )?;
    users.activate();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.call_count(), 0, "a zero interval does not poll");

    client.invalidate_query("/users");
    wait_for_calls(&transport, 1).await;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(transport.call_count(), 1);
    assert!(users.is_success());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deactivate_right_after_invalidate_leaves_no_update() -> Result<()> {
    for _ in 0..50 {
        let transport = MockTransport::new()
            .fallback(MockReply::ok(Response::ok(json!([1]))).after(Duration::from_millis(20)));
        let client = Client::new(transport.clone());
        let successes = Arc::new(AtomicUsize::new(0));
        let s = successes.clone();

        let users = client.query::<Value>(
            "/users",
            QueryOptions::default()
                .refetch_on_mount(false)
                .on_success(move |_| {
                    s.fetch_add(1, Ordering::SeqCst);
                }),
        )?;
        users.activate();
        tokio::task::yield_now().await;

        client.invalidate_query("/users");
        users.deactivate();
        sleep(Duration::from_millis(60)).await;

        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert!(!users.is_success());
    }
    Ok(())
}
