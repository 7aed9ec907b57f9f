use hex_literal::hex;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use web3::types::{Address, Bytes, H256, U256};

use super::eip712::{self, BigEndian, EXCHANGE_NAME_HASH};
use crate::utils::{
    math::mul_div_floor,
    serde::{u256_dec, u64_dec},
};

// See tests for the pre-image
const ORDER_TYPE_HASH: [u8; 32] =
    hex!("f80322eb8376aafb64eadf8f0d7623f22130fd9491a221e902b713cb984a7534");

/// An off-chain 0x v3 limit order. Immutable; coordinator state *about* an
/// order lives in the repository, keyed by [`Order::hash`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub maker_address:           Address,
    pub taker_address:           Address,
    pub fee_recipient_address:   Address,
    pub sender_address:          Address,
    #[serde(with = "u256_dec")]
    pub maker_asset_amount:      U256,
    #[serde(with = "u256_dec")]
    pub taker_asset_amount:      U256,
    #[serde(with = "u256_dec")]
    pub maker_fee:               U256,
    #[serde(with = "u256_dec")]
    pub taker_fee:               U256,
    #[serde(with = "u64_dec")]
    pub expiration_time_seconds: u64,
    #[serde(with = "u256_dec")]
    pub salt:                    U256,
    pub maker_asset_data:        Bytes,
    pub taker_asset_data:        Bytes,
    pub maker_fee_asset_data:    Bytes,
    pub taker_fee_asset_data:    Bytes,
    pub exchange_address:        Address,
    pub chain_id:                u64,
}

impl Order {
    pub fn hash(&self) -> H256 {
        eip712::hash_typed_data(self.domain_hash(), self.struct_hash())
    }

    pub fn expired_at(&self, now_seconds: u64) -> bool {
        self.expiration_time_seconds < now_seconds
    }

    /// `floor(makerAmount · takerAssetAmount / makerAssetAmount)`
    pub fn taker_fill_amount(&self, maker_amount: U256) -> U256 {
        mul_div_floor(
            maker_amount,
            self.taker_asset_amount,
            self.maker_asset_amount,
        )
    }

    /// `floor(takerAmount · makerAssetAmount / takerAssetAmount)`
    pub fn maker_fill_amount(&self, taker_amount: U256) -> U256 {
        mul_div_floor(
            taker_amount,
            self.maker_asset_amount,
            self.taker_asset_amount,
        )
    }

    fn domain_hash(&self) -> H256 {
        eip712::hash_domain(EXCHANGE_NAME_HASH, self.chain_id, self.exchange_address)
    }

    /// Compute the EIP712 hash of the order struct.
    /// See <https://github.com/0xProject/0x-protocol-specification/blob/master/v3/v3-specification.md#hashing-an-order>
    fn struct_hash(&self) -> H256 {
        let mut hasher = Keccak256::new();
        hasher.update(ORDER_TYPE_HASH);
        hasher.update(H256::from(self.maker_address));
        hasher.update(H256::from(self.taker_address));
        hasher.update(H256::from(self.fee_recipient_address));
        hasher.update(H256::from(self.sender_address));
        hasher.update(BigEndian::from(&self.maker_asset_amount));
        hasher.update(BigEndian::from(&self.taker_asset_amount));
        hasher.update(BigEndian::from(&self.maker_fee));
        hasher.update(BigEndian::from(&self.taker_fee));
        hasher.update(BigEndian::from(&U256::from(self.expiration_time_seconds)));
        hasher.update(BigEndian::from(&self.salt));
        hasher.update(eip712::keccak(&self.maker_asset_data.0));
        hasher.update(eip712::keccak(&self.taker_asset_data.0));
        hasher.update(eip712::keccak(&self.maker_fee_asset_data.0));
        hasher.update(eip712::keccak(&self.taker_fee_asset_data.0));
        H256::from(<[u8; 32]>::from(hasher.finalize()))
    }
}

/// An order together with the maker signature bytes carried in calldata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    #[serde(flatten)]
    pub order:     Order,
    pub signature: Bytes,
}

impl SignedOrder {
    pub fn hash(&self) -> H256 {
        self.order.hash()
    }
}
