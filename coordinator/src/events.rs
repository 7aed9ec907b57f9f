//! Lifecycle event fanout to subscribers.
//!
//! Delivery is best-effort per chain id over broadcast channels; there is no
//! persistence and no retry. Attaching a transport (e.g. WebSocket fanout)
//! means consuming [`EventBroadcaster::subscribe`].

use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};
use serde::Serialize;
use strum_macros::IntoStaticStr;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use web3::types::{H256, U256};

use crate::{
    orders::SignedOrder,
    utils::serde::{u256_vec_dec, u64_dec},
};

const CHANNEL_CAPACITY: usize = 256;

static EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("events_emitted", "Events emitted by kind.", &["kind"]).unwrap()
});

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillRequestReceived {
    pub transaction_hash: H256,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillRequestAccepted {
    pub approval_hash:                    H256,
    pub function_name:                    &'static str,
    pub order:                            SignedOrder,
    #[serde(with = "u256_vec_dec")]
    pub taker_asset_fill_amounts:         Vec<U256>,
    pub approved_order_hashes:            Vec<H256>,
    #[serde(with = "u64_dec")]
    pub approval_expiration_time_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequestAccepted {
    pub transaction_hash:   H256,
    pub zerox_order_hashes: Vec<H256>,
}

#[derive(Debug, Clone, PartialEq, Serialize, IntoStaticStr)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    FillRequestReceived(FillRequestReceived),
    FillRequestAccepted(Box<FillRequestAccepted>),
    CancelRequestAccepted(CancelRequestAccepted),
}

/// Per-chain-id event fanout.
#[derive(Clone, Debug)]
pub struct EventBroadcaster {
    channels: Arc<HashMap<u64, broadcast::Sender<Event>>>,
}

impl EventBroadcaster {
    pub fn new(chain_ids: impl IntoIterator<Item = u64>) -> Self {
        let channels = chain_ids
            .into_iter()
            .map(|chain_id| (chain_id, broadcast::channel(CHANNEL_CAPACITY).0))
            .collect();
        Self {
            channels: Arc::new(channels),
        }
    }

    /// Emit an event to the chain's subscribers, if any.
    pub fn send(&self, chain_id: u64, event: Event) {
        EVENTS
            .with_label_values(&[<&'static str>::from(&event)])
            .inc();
        if let Some(sender) = self.channels.get(&chain_id) {
            // An error only means there are no subscribers right now.
            let _result = sender.send(event);
        } else {
            debug!(chain_id, "No event channel for chain");
        }
    }

    pub fn subscribe(&self, chain_id: u64) -> Option<broadcast::Receiver<Event>> {
        self.channels.get(&chain_id).map(broadcast::Sender::subscribe)
    }

    /// The chain's event feed as a stream, for transports.
    pub fn stream(&self, chain_id: u64) -> Option<BroadcastStream<Event>> {
        self.subscribe(chain_id).map(BroadcastStream::new)
    }
}

#[cfg(test)]
pub mod test {
    use pretty_assertions::assert_eq;
    use serde_json::{json, to_value};

    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = Event::FillRequestReceived(FillRequestReceived {
            transaction_hash: H256::from([0x11; 32]),
        });
        assert_eq!(
            to_value(&event).unwrap(),
            json!({
                "type": "FILL_REQUEST_RECEIVED",
                "data": {
                    "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
                },
            })
        );
    }

    #[tokio::test]
    async fn test_fanout_is_per_chain() {
        let broadcaster = EventBroadcaster::new([1, 42]);
        let mut mainnet = broadcaster.subscribe(1).unwrap();
        let mut kovan = broadcaster.subscribe(42).unwrap();

        let event = Event::FillRequestReceived(FillRequestReceived {
            transaction_hash: H256::zero(),
        });
        broadcaster.send(1, event.clone());
        assert_eq!(mainnet.recv().await.unwrap(), event);
        assert!(kovan.try_recv().is_err());

        // Unknown chains are dropped, not errors.
        broadcaster.send(99, event);
    }

    #[tokio::test]
    async fn test_stream_wrapper() {
        use futures::StreamExt as _;

        let broadcaster = EventBroadcaster::new([1]);
        let mut stream = broadcaster.stream(1).unwrap();
        let event = Event::CancelRequestAccepted(CancelRequestAccepted {
            transaction_hash:   H256::zero(),
            zerox_order_hashes: vec![H256::from([0x22; 32])],
        });
        broadcaster.send(1, event.clone());
        assert_eq!(stream.next().await.unwrap().unwrap(), event);
        assert!(broadcaster.stream(2).is_none());
    }
}
