#![doc = include_str!("../Readme.md")]
#![warn(clippy::all, clippy::pedantic, clippy::cargo, clippy::nursery)]

mod api;
mod config;
mod engine;
mod ethereum;
mod events;
mod orders;
mod repository;
mod utils;

use core::time::Duration;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::{Context as _, Result as AnyResult};
use serde::{Deserialize, Serialize};
use serde_json::{to_value, Value as JsonValue};
use tokio::sync::oneshot;
use tracing::{error, info};
use web3::types::{Address, H256};

pub use crate::config::Options;
use crate::{
    api::Error as ApiError,
    engine::{ApprovalEngine, RequestError},
    ethereum::{ChainInfo, Ethereum},
    events::EventBroadcaster,
    orders::SignedZeroExTransaction,
    repository::{MemoryRepository, Repository},
    utils::spawn_or_abort,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestTransactionBody {
    signed_transaction: SignedZeroExTransaction,
    tx_origin:          Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SoftCancelsBody {
    order_hashes: Vec<H256>,
}

#[derive(Clone, Debug)]
struct App {
    engines:     Arc<HashMap<u64, ApprovalEngine>>,
    broadcaster: EventBroadcaster,
}

impl App {
    async fn connect(options: &Options) -> AnyResult<Self> {
        let settings = config::load_chain_settings(&options.chain_settings)?;
        let broadcaster = EventBroadcaster::new(settings.keys().copied());
        let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::default());
        let selective_delay = Duration::from_millis(options.selective_delay_ms);
        let expiration_duration = Duration::from_secs(options.expiration_duration_seconds);

        let mut engines = HashMap::with_capacity(settings.len());
        for (chain_id, chain_settings) in settings {
            let exchange = chain_settings
                .exchange_address
                .or_else(|| ChainInfo::canonical_exchange(chain_id))
                .with_context(|| {
                    format!(
                        "no canonical exchange known for chain {}; set exchangeAddress",
                        chain_id
                    )
                })?;
            let chain = ChainInfo {
                chain_id,
                exchange,
                coordinator: chain_settings.coordinator_contract_address,
            };
            let signers = config::signer_map(&chain_settings)?;
            let ethereum = Ethereum::connect(
                &chain_settings.rpc_url,
                chain.clone(),
                chain_settings.dev_utils_address,
            )
            .await?;
            let engine = ApprovalEngine::new(
                chain,
                repository.clone(),
                Arc::new(ethereum.oracle),
                broadcaster.clone(),
                signers,
                selective_delay,
                expiration_duration,
            );
            engines.insert(chain_id, engine);
        }
        Ok(Self {
            engines: Arc::new(engines),
            broadcaster,
        })
    }

    fn engine(&self, chain_id: u64) -> Result<&ApprovalEngine, ApiError> {
        self.engines
            .get(&chain_id)
            .ok_or(ApiError::UnknownChainId(chain_id))
    }

    /// The only configured chain, when there is exactly one.
    fn sole_chain_id(&self) -> Option<u64> {
        if self.engines.len() == 1 {
            self.engines.keys().next().copied()
        } else {
            None
        }
    }

    async fn request_transaction(
        &self,
        chain_id: u64,
        body: RequestTransactionBody,
    ) -> Result<JsonValue, ApiError> {
        let outcome = self
            .engine(chain_id)?
            .handle_request(body.signed_transaction, body.tx_origin)
            .await
            .map_err(|error| {
                if !error.is_client_error() {
                    error!(?error, "Internal error handling transaction request");
                }
                ApiError::from(error)
            })?;
        Ok(to_value(&outcome)?)
    }

    async fn soft_cancels(
        &self,
        chain_id: u64,
        body: SoftCancelsBody,
    ) -> Result<JsonValue, ApiError> {
        let order_hashes = self
            .engine(chain_id)?
            .soft_cancelled_subset(&body.order_hashes)
            .await
            .map_err(|error| {
                error!(?error, "Error reading soft cancels");
                ApiError::Request(RequestError::Internal(error))
            })?;
        Ok(to_value(&SoftCancelsBody { order_hashes })?)
    }
}

#[allow(clippy::missing_errors_doc)]
pub async fn main(options: Options, shutdown: oneshot::Receiver<()>) -> AnyResult<()> {
    let serve_address = SocketAddr::from(([0, 0, 0, 0], options.http_port));
    let app = App::connect(&options).await?;

    // Start the API server
    spawn_or_abort(async move {
        api::serve(app, &serve_address).await?;
        AnyResult::Ok(())
    });

    info!("Coordinator started, waiting for shutdown signal");
    shutdown.await?;
    // TODO: Graceful shutdown draining in-flight selective delays

    Ok(())
}

#[cfg(test)]
pub mod test {
    use pretty_assertions::assert_eq;
    use serde_json::{from_value, json};
    use tracing::warn;
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = from_value::<RequestTransactionBody>(json!({
            "signedTransaction": {
                "salt": "123",
                "expirationTimeSeconds": "1615000000",
                "signerAddress": "0x5409ed021d9299bf6814279a6a1411a7e866a631",
                "data": "0xdeadbeef",
                "signature": "0x1b00",
            },
            "txOrigin": "0x7620a5cb404fd7e689f59b65c1cf5b6d21b6f730",
        }))
        .unwrap();
        assert_eq!(
            body.tx_origin,
            "0x7620a5cb404fd7e689f59b65c1cf5b6d21b6f730".parse().unwrap()
        );
        assert_eq!(body.signed_transaction.transaction.salt, 123.into());
    }

    #[test]
    #[traced_test]
    fn test_with_log_output() {
        warn!("logged on the warn level");
        assert!(logs_contain("logged on the warn level"));
    }
}
