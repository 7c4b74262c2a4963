//! Discrete actions published by one peer and observed by both.

mod common;

use std::sync::{Arc, Mutex};

use common::Fixture;
use serde_json::json;
use tandem::{ActionKind, ActionMessage, PortError, Role};
use tandem_testing::{TestResult, settle};

type Seen = Arc<Mutex<Vec<ActionMessage>>>;

fn recorder() -> (Seen, impl Fn(&ActionMessage) + Send + Sync + 'static) {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let listener = move |message: &ActionMessage| {
        sink.lock().expect("listener lock").push(message.clone());
    };
    (seen, listener)
}

#[tokio::test(start_paused = true)]
async fn tab_change_reaches_both_peers() -> TestResult {
    let fx = Fixture::start()?;
    let (agent_seen, agent_listener) = recorder();
    let (customer_seen, customer_listener) = recorder();
    let _agent_sub = fx
        .peers
        .agent
        .session
        .broadcaster()
        .subscribe(ActionKind::TabChanged, agent_listener);
    let _customer_sub = fx
        .peers
        .customer
        .session
        .broadcaster()
        .subscribe(ActionKind::TabChanged, customer_listener);

    let local = fx
        .peers
        .customer
        .session
        .publish_action(ActionKind::TabChanged, json!({ "tab": "payment" }))
        .await?;
    assert_eq!(local, 1);
    assert!(settle(|| !agent_seen.lock().expect("lock").is_empty(), 100).await);

    let received = agent_seen.lock().expect("lock").clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].user_type, Role::Customer);
    assert_eq!(received[0].data, json!({ "tab": "payment" }));
    assert_eq!(customer_seen.lock().expect("lock").len(), 1);
    fx.peers.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn remote_subscriptions_skip_local_publications() -> TestResult {
    let fx = Fixture::start()?;
    let (seen, listener) = recorder();
    let _sub = fx
        .peers
        .agent
        .session
        .broadcaster()
        .subscribe_remote(ActionKind::TabChanged, listener);

    fx.peers
        .agent
        .session
        .publish_action(ActionKind::TabChanged, json!("orders"))
        .await?;
    fx.peers
        .customer
        .session
        .publish_action(ActionKind::TabChanged, json!("catalog"))
        .await?;
    assert!(settle(|| !seen.lock().expect("lock").is_empty(), 100).await);

    let seen = seen.lock().expect("lock").clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].data, json!("catalog"));
    fx.peers.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dropped_subscription_stops_delivery() -> TestResult {
    let fx = Fixture::start()?;
    let (seen, listener) = recorder();
    let subscription = fx
        .peers
        .customer
        .session
        .broadcaster()
        .subscribe(ActionKind::TabChanged, listener);
    drop(subscription);

    fx.peers
        .agent
        .session
        .publish_action(ActionKind::TabChanged, json!(null))
        .await?;
    assert!(settle(|| fx.peers.agent.port.delivered() == 1, 100).await);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(seen.lock().expect("lock").is_empty());
    fx.peers.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_rejections_are_retried() -> TestResult {
    let fx = Fixture::start()?;
    let (seen, listener) = recorder();
    let _sub = fx
        .peers
        .customer
        .session
        .broadcaster()
        .subscribe(ActionKind::TabChanged, listener);

    fx.peers.agent.port.fail_next(PortError::Rejected("busy".into()));
    fx.peers
        .agent
        .session
        .publish_action(ActionKind::TabChanged, json!("retry"))
        .await?;
    assert!(settle(|| seen.lock().expect("lock").len() == 1, 100).await);
    fx.peers.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn closed_channel_is_reported_after_local_delivery() -> TestResult {
    let fx = Fixture::start()?;
    let (seen, listener) = recorder();
    let _sub = fx
        .peers
        .agent
        .session
        .broadcaster()
        .subscribe(ActionKind::TabChanged, listener);

    fx.peers.agent.port.fail_next(PortError::Closed);
    let result = fx
        .peers
        .agent
        .session
        .publish_action(ActionKind::TabChanged, json!("lost"))
        .await;
    assert!(matches!(result, Err(tandem::Error::Port(PortError::Closed))));
    assert_eq!(seen.lock().expect("lock").len(), 1);
    fx.peers.shutdown().await;
    Ok(())
}
