use crate::entities::stock_movement::MovementKind;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after a mutation commits.
///
/// The ledger keeps no caller-side caches: consumers subscribe to these and
/// re-query the aggregator for the affected products instead of holding their
/// own copies of warehouse state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    SupplyRecorded {
        operation_id: Uuid,
        supply_id: i64,
        batch_ids: Vec<i64>,
        product_ids: Vec<i64>,
    },
    StockConsumed {
        operation_id: Uuid,
        product_id: i64,
        kind: MovementKind,
        quantity: i32,
        batches_touched: usize,
    },
    SupplyDeleted {
        operation_id: Uuid,
        supply_id: i64,
        batches_removed: u64,
        movements_removed: u64,
        product_ids: Vec<i64>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates an event channel with the given buffer size.
pub fn event_channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Drains an event receiver, logging each event as structured JSON. Useful
/// for embedders that only want an audit trail of notifications.
pub fn spawn_event_logger(mut receiver: mpsc::Receiver<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match serde_json::to_string(&event) {
                Ok(payload) => info!(event = %payload, "warehouse event"),
                Err(e) => warn!("failed to serialize event: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive() {
        let (sender, mut rx) = event_channel(4);
        sender
            .send(Event::StockConsumed {
                operation_id: Uuid::new_v4(),
                product_id: 1,
                kind: MovementKind::Sale,
                quantity: 5,
                batches_touched: 1,
            })
            .await
            .unwrap();

        match rx.recv().await {
            Some(Event::StockConsumed { quantity, .. }) => assert_eq!(quantity, 5),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
