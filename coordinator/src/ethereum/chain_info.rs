use web3::types::Address;

/// Immutable per-chain context. Constructed once at startup and passed by
/// reference; parameterizes calldata decoding and both EIP712 domains.
#[derive(Clone, PartialEq, Debug)]
pub struct ChainInfo {
    pub chain_id: u64,

    /// Canonical Exchange v3 contract; the verifying contract for order and
    /// transaction hashes.
    pub exchange: Address,

    /// Coordinator contract; the verifying contract for approval hashes.
    pub coordinator: Address,
}

impl ChainInfo {
    /// The canonical Exchange v3 deployment for well-known chain ids.
    pub fn canonical_exchange(chain_id: u64) -> Option<Address> {
        match chain_id {
            // Mainnet
            1 => Some(
                "0x61935CbDd02287B511119DDb11Aeb42F1593b7Ef"
                    .parse()
                    .unwrap(),
            ),
            // Kovan
            42 => Some(
                "0x4eacd0aF335451709e1e7B570B8Ea68EdEC8bc97"
                    .parse()
                    .unwrap(),
            ),
            // Ganache snapshot
            1337 => Some(
                "0x1Dc4c1cEFEF38a777b15aA20260a54E584b16C48"
                    .parse()
                    .unwrap(),
            ),
            _ => None,
        }
    }
}

/// Values for the Ganache snapshot used across tests
impl Default for ChainInfo {
    fn default() -> Self {
        Self {
            chain_id:    1337,
            exchange:    "0x1Dc4c1cEFEF38a777b15aA20260a54E584b16C48"
                .parse()
                .unwrap(),
            coordinator: "0x4Ef40d1bf0983899892946830aBF99eCA2DbC5Ce"
                .parse()
                .unwrap(),
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn test_canonical_exchange() {
        assert_eq!(
            ChainInfo::canonical_exchange(1337),
            Some(ChainInfo::default().exchange)
        );
        assert_eq!(ChainInfo::canonical_exchange(99), None);
    }
}
