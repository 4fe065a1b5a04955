//! Per-chain settings: loaded from a TOML file at startup and turned into the
//! immutable [`ChainContext`]s the engine works with.

use crate::{engine::ChainContext, oracle::Web3OrderStateFetcher};
use anyhow::{ensure, Context, Result};
use model::DomainSeparator;
use primitive_types::H160;
use secp256k1::SecretKey;
use serde::Deserialize;
use std::{fmt, path::Path, sync::Arc};
use web3::signing::{Key, SecretKeyRef};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub chains: Vec<ChainSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSettings {
    pub chain_id: u64,
    pub rpc_url: String,
    pub exchange_address: H160,
    /// The EIP-712 `verifyingContract` of the coordinator on this chain.
    pub coordinator_address: H160,
    /// The ERC-20 asset proxy: the account traders grant allowances to.
    pub asset_proxy_address: H160,
    pub fee_recipients: Vec<FeeRecipientSettings>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeeRecipientSettings {
    pub address: H160,
    pub private_key: PrivateKey,
}

// Manual implementation so the key can never end up in logs.
impl fmt::Debug for FeeRecipientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeeRecipientSettings")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// A secp256k1 secret key parsed from optionally 0x-prefixed hex.
pub struct PrivateKey(pub SecretKey);

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(&hex_str);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut bytes).map_err(serde::de::Error::custom)?;
        SecretKey::from_slice(&bytes)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let settings: Settings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        ensure!(!settings.chains.is_empty(), "no chains configured");
        Ok(settings)
    }
}

/// Builds one immutable context per configured chain, verifying every
/// fee-recipient key actually controls its configured address.
pub fn chain_contexts(settings: &Settings) -> Result<Vec<ChainContext>> {
    settings.chains.iter().map(chain_context).collect()
}

fn chain_context(chain: &ChainSettings) -> Result<ChainContext> {
    ensure!(
        !chain.fee_recipients.is_empty(),
        "chain {} has no fee recipients",
        chain.chain_id
    );
    let fee_recipients = chain
        .fee_recipients
        .iter()
        .map(|recipient| {
            let derived = SecretKeyRef::new(&recipient.private_key.0).address();
            ensure!(
                derived == recipient.address,
                "private key for fee recipient {:?} controls {:?}",
                recipient.address,
                derived,
            );
            Ok((recipient.address, recipient.private_key.0))
        })
        .collect::<Result<_>>()?;

    let transport = web3::transports::Http::new(&chain.rpc_url)
        .with_context(|| format!("invalid rpc url for chain {}", chain.chain_id))?;
    let web3 = web3::Web3::new(transport);
    let order_states = Web3OrderStateFetcher::new(
        web3,
        chain.exchange_address,
        chain.asset_proxy_address,
    );

    Ok(ChainContext {
        chain_id: chain.chain_id,
        exchange_address: chain.exchange_address,
        exchange_domain: DomainSeparator::new_exchange(chain.chain_id, chain.exchange_address),
        coordinator_domain: DomainSeparator::new_coordinator(
            chain.chain_id,
            chain.coordinator_address,
        ),
        fee_recipients,
        order_states: Arc::new(order_states),
    })
}
