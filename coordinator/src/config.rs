//! Process configuration: flags/env for the scalar knobs, plus a JSON
//! settings file for the per-chain map (fee recipients, contract addresses,
//! RPC endpoints).

use std::{collections::HashMap, fs, path::PathBuf};

use anyhow::{bail, Context as _, Result as AnyResult};
use secp256k1::SecretKey;
use serde::Deserialize;
use structopt::StructOpt;
use url::Url;
use web3::types::{Address, H256};

use crate::utils::crypto;

#[derive(Debug, PartialEq, StructOpt)]
pub struct Options {
    /// HTTP listen port for the coordinator API.
    #[structopt(long, env = "HTTP_PORT", default_value = "3000")]
    pub http_port: u16,

    /// Anti-front-running delay in milliseconds. 0 disables the post-delay
    /// re-validation.
    #[structopt(long, env = "SELECTIVE_DELAY_MS", default_value = "1000")]
    pub selective_delay_ms: u64,

    /// Lifetime of an issued approval in seconds.
    #[structopt(long, env = "EXPIRATION_DURATION_SECONDS", default_value = "90")]
    pub expiration_duration_seconds: u64,

    /// Path to the per-chain settings JSON file.
    #[structopt(long, env = "CHAIN_SETTINGS", default_value = "chain-settings.json")]
    pub chain_settings: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecipient {
    pub address:     Address,
    pub private_key: H256,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSettings {
    pub coordinator_contract_address: Address,
    pub rpc_url:                      Url,
    pub dev_utils_address:            Address,
    /// Overrides the built-in canonical Exchange address for the chain.
    #[serde(default)]
    pub exchange_address:             Option<Address>,
    pub fee_recipients:               Vec<FeeRecipient>,
}

pub fn load_chain_settings(path: &PathBuf) -> AnyResult<HashMap<u64, ChainSettings>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("error reading chain settings from {}", path.display()))?;
    let settings: HashMap<u64, ChainSettings> = serde_json::from_str(&text)
        .with_context(|| format!("error parsing chain settings from {}", path.display()))?;
    if settings.is_empty() {
        bail!("chain settings must configure at least one chain");
    }
    Ok(settings)
}

impl FeeRecipient {
    pub fn secret_key(&self) -> AnyResult<SecretKey> {
        let key = SecretKey::from_slice(self.private_key.as_bytes())
            .with_context(|| format!("invalid private key for fee recipient {:?}", self.address))?;
        Ok(key)
    }
}

/// Fee-recipient signing keys for a chain, with every key checked to derive
/// its configured address. A mismatch is a config bug and aborts startup.
pub fn signer_map(settings: &ChainSettings) -> AnyResult<HashMap<Address, SecretKey>> {
    let mut signers = HashMap::with_capacity(settings.fee_recipients.len());
    for recipient in &settings.fee_recipients {
        let key = recipient.secret_key()?;
        let derived = crypto::address(&key);
        if derived != recipient.address {
            bail!(
                "private key for fee recipient {:?} derives {:?}",
                recipient.address,
                derived
            );
        }
        signers.insert(recipient.address, key);
    }
    if signers.is_empty() {
        bail!("at least one fee recipient must be configured per chain");
    }
    Ok(signers)
}

#[cfg(test)]
pub mod test {
    use pretty_assertions::assert_eq;
    use serde_json::{from_value, json};

    use super::*;

    fn example_settings(address: Address) -> ChainSettings {
        from_value(json!({
            "coordinatorContractAddress": "0x4ef40d1bf0983899892946830abf99eca2dbc5ce",
            "rpcUrl": "http://localhost:8545/",
            "devUtilsAddress": "0x74134cf88b21383713e096a5ecf59e297dc7f547",
            "feeRecipients": [{
                "address": format!("{:?}", address),
                "privateKey": "0x1111111111111111111111111111111111111111111111111111111111111111",
            }],
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_settings() {
        let address = crypto::address(&SecretKey::from_slice(&[0x11; 32]).unwrap());
        let settings = example_settings(address);
        assert_eq!(settings.exchange_address, None);
        assert_eq!(settings.fee_recipients.len(), 1);
        assert_eq!(settings.rpc_url.as_str(), "http://localhost:8545/");
    }

    #[test]
    fn test_signer_map_validates_addresses() {
        let key = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let good = example_settings(crypto::address(&key));
        let signers = signer_map(&good).unwrap();
        assert_eq!(signers.len(), 1);
        assert!(signers.contains_key(&crypto::address(&key)));

        // A key that derives a different address is a config bug.
        let bad = example_settings(Address::from([0x99; 20]));
        assert!(signer_map(&bad).is_err());
    }

    #[test]
    fn test_chain_map_keys_are_numeric() {
        let settings: HashMap<u64, ChainSettings> = from_value(json!({
            "1337": {
                "coordinatorContractAddress": "0x4ef40d1bf0983899892946830abf99eca2dbc5ce",
                "rpcUrl": "http://localhost:8545/",
                "devUtilsAddress": "0x74134cf88b21383713e096a5ecf59e297dc7f547",
                "feeRecipients": [],
            },
        }))
        .unwrap();
        assert!(settings.contains_key(&1337));
    }
}
