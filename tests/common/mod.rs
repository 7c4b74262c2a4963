//! Shared fixtures for integration tests: an agent and a customer session
//! joined by an in-memory channel, each with a catalog transfer stream, a
//! catalog scroll channel, and the `tab-changed` action.

use std::{sync::Arc, time::Duration};

use serde_json::{Value, json};
use tandem::{
    ActionKind,
    Role,
    SourceId,
    TransferEvent,
    session::SessionBuilder,
};
use tandem_testing::{PeerPair, RecordingSurface};
use tokio::sync::mpsc;

pub const NOW: u64 = 1_700_000_000_000;
pub const STREAM: &str = "catalog";
pub const SCROLL: &str = "catalog-scroll";

pub struct Side {
    pub surface: Arc<RecordingSurface>,
    pub events: mpsc::UnboundedReceiver<TransferEvent>,
}

pub struct Fixture {
    pub peers: PeerPair,
    pub agent: Side,
    pub customer: Side,
}

impl Fixture {
    pub fn start() -> tandem::Result<Self> {
        let (agent_tx, agent_events) = mpsc::unbounded_channel();
        let (customer_tx, customer_events) = mpsc::unbounded_channel();
        let agent_surface = Arc::new(RecordingSurface::default());
        let customer_surface = Arc::new(RecordingSurface::default());

        let peers = PeerPair::start(NOW, |builder: SessionBuilder, role| {
            let (observer, surface, source) = match role {
                Role::Agent => (agent_tx.clone(), agent_surface.clone(), "peerA"),
                Role::Customer => (customer_tx.clone(), customer_surface.clone(), "peerB"),
            };
            builder
                .transfer_stream(STREAM, Arc::new(observer))?
                .sync_channel_with_source(SCROLL, surface, SourceId::new(source))?
                .action(ActionKind::TabChanged)
        })?;

        Ok(Self {
            peers,
            agent: Side {
                surface: agent_surface,
                events: agent_events,
            },
            customer: Side {
                surface: customer_surface,
                events: customer_events,
            },
        })
    }
}

/// A product catalog whose JSON form is roughly `items * 53` bytes.
pub fn catalog(items: usize) -> Value {
    let products: Vec<Value> = (0..items)
        .map(|n| json!({ "sku": format!("SKU-{n:05}"), "name": format!("Product {n}"), "price": n * 3 }))
        .collect();
    json!({ "products": products })
}

/// Wait for the next terminal transfer event, skipping progress reports.
pub async fn next_outcome(events: &mut mpsc::UnboundedReceiver<TransferEvent>) -> TransferEvent {
    let wait = async {
        loop {
            match events.recv().await {
                Some(TransferEvent::Progress { .. }) => {}
                Some(event) => return event,
                None => panic!("observer channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .expect("transfer outcome within a minute")
}
