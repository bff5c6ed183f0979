//! Users list example demonstrating queries, invalidation and mutations.
//!
//! This example shows:
//! - An active query that fetches on activation and is served from the cache
//! - A mutation that invalidates the query key, refetching the active query
//! - Retries against a flaky backend
//! - Watching state transitions through a receiver
//!
//! A scripted `MockTransport` stands in for the HTTP backend.
//!
//! Run with: `RUST_LOG=querykit=debug cargo run --example users`

use std::time::Duration;

use color_eyre::Result;
use querykit::prelude::*;
use querykit::transport::Response;
use querykit::transport::mock::{MockReply, MockTransport};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// A user as returned by the backend
#[derive(Debug, Clone, Deserialize)]
struct User {
    id: u32,
    name: String,
}

/// Payload for creating a user
#[derive(Debug, Serialize)]
struct NewUser {
    name: String,
}

fn print_users(label: &str, state: &QueryState<Vec<User>>) {
    match state.data() {
        Some(users) => {
            let names: Vec<_> = users.iter().map(|u| format!("#{} {}", u.id, u.name)).collect();
            println!("{label}: {}", names.join(", "));
        }
        None => println!("{label}: {:?}", state.phase),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let transport = MockTransport::new()
        // First fetch fails once, then succeeds on retry.
        .fail("connection reset")
        .reply(Response::ok(json!([{"id": 1, "name": "Ada"}])))
        // The mutation.
        .reply(Response::ok(json!({"id": 2, "name": "Grace"})))
        // Refetch after invalidation.
        .push(
            MockReply::ok(Response::ok(json!([
                {"id": 1, "name": "Ada"},
                {"id": 2, "name": "Grace"},
            ])))
            .after(Duration::from_millis(50)),
        );

    let client = Client::with_config(
        transport.clone(),
        ClientConfig::default()
            .with_stale_time(Duration::from_secs(30))
            .with_retry(RetryPolicy::new(2, Duration::from_millis(100))),
    );

    let users = client.query::<Vec<User>>("/users", QueryOptions::default())?;
    let mut changes = users.subscribe();

    users.activate();
    while !changes.borrow_and_update().is_success() {
        changes.changed().await?;
    }
    print_users("after activate", &users.state());

    // Served from the cache while fresh.
    print_users("cached refetch", &users.refetch().await);

    let create = client.mutation::<User, NewUser>(
        "/users",
        Method::Post,
        MutationOptions::default()
            .invalidates(["/users"])
            .on_success(|user, vars| println!("created {user:?} from {vars:?}")),
    )?;
    create
        .mutate_async(NewUser {
            name: "Grace".to_string(),
        })
        .await?;

    // The invalidation refetches the active query in the background.
    changes.changed().await?;
    while !changes.borrow_and_update().is_success() {
        changes.changed().await?;
    }
    print_users("after mutation", &users.state());

    users.deactivate();
    println!("transport calls: {}", transport.call_count());
    Ok(())
}
