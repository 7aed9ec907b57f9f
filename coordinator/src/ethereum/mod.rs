mod chain_info;
mod error;
mod oracle;

use anyhow::{Context as _, Result as AnyResult};
use tracing::info;
use url::Url;
use web3::{contract::Contract, transports::Http, types::Address, Web3};

pub use self::{
    chain_info::ChainInfo,
    error::Error,
    oracle::{DevUtilsOracle, OrderStateOracle, TraderState},
};

pub(crate) const EXCHANGE_ABI: &[u8] = include_bytes!("../../ethereum-abis/exchange.json");
const DEV_UTILS_ABI: &[u8] = include_bytes!("../../ethereum-abis/dev_utils.json");

#[derive(Clone, Debug)]
pub struct Ethereum {
    pub chain:  ChainInfo,
    pub web3:   Web3<Http>,
    pub oracle: DevUtilsOracle,
}

impl Ethereum {
    pub async fn connect(url: &Url, chain: ChainInfo, dev_utils: Address) -> AnyResult<Self> {
        info!("Connecting to Ethereum at {}", url);
        let transport = Http::new(url.as_str())?;
        let web3 = Web3::new(transport);

        // Verify the node serves the configured chain
        let chain_id = web3.eth().chain_id().await?;
        anyhow::ensure!(
            chain_id.as_u64() == chain.chain_id,
            "node at {} serves chain {} but chain {} was configured",
            url,
            chain_id,
            chain.chain_id
        );
        info!("Connected to Ethereum with chain id {}", chain_id);

        // Wrap contracts
        let exchange = Contract::from_json(web3.eth(), chain.exchange, EXCHANGE_ABI)
            .context("invalid exchange ABI")?;
        let dev_utils = Contract::from_json(web3.eth(), dev_utils, DEV_UTILS_ABI)
            .context("invalid dev_utils ABI")?;
        let oracle = DevUtilsOracle::new(dev_utils, exchange);

        Ok(Self {
            chain,
            web3,
            oracle,
        })
    }
}
