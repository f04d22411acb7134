//! Chain and cluster registry.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// The chain family a [`Chain`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Evm,
    Solana,
}

/// A registered chain. EVM ids are canonical lowercase hex, Solana ids are cluster names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub id: String,
    pub name: String,
    pub chain_type: ChainType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl Chain {
    pub fn evm(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), chain_type: ChainType::Evm, rpc_url: None }
    }

    pub fn cluster(id: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        let id = id.into();
        Self { name: id.clone(), id, chain_type: ChainType::Solana, rpc_url: Some(rpc_url.into()) }
    }

    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Some(rpc_url.into());
        self
    }
}

const KNOWN_EVM_CHAINS: &[(u64, &str)] = &[
    (1, "Ethereum Mainnet"),
    (10, "OP Mainnet"),
    (56, "BNB Smart Chain"),
    (137, "Polygon Mainnet"),
    (8453, "Base"),
    (31337, "Localhost"),
    (42161, "Arbitrum One"),
    (43114, "Avalanche C-Chain"),
    (11155111, "Sepolia"),
];

const KNOWN_CLUSTERS: &[(&str, &str)] = &[
    ("mainnet-beta", "https://api.mainnet-beta.solana.com"),
    ("devnet", "https://api.devnet.solana.com"),
    ("testnet", "https://api.testnet.solana.com"),
    ("localnet", "http://127.0.0.1:8899"),
];

/// Normalizes an EVM chain id given as hex (`0x89`) or decimal (`137`) to lowercase hex.
pub fn normalize_chain_id(raw: &str) -> Result<String, ValidationError> {
    parse_chain_id(raw).map(|id| format!("{id:#x}"))
}

/// Decimal form of an EVM chain id, as returned by `net_version`.
pub fn chain_id_to_decimal(raw: &str) -> Result<String, ValidationError> {
    parse_chain_id(raw).map(|id| id.to_string())
}

fn parse_chain_id(raw: &str) -> Result<u64, ValidationError> {
    let trimmed = raw.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    match parsed {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::InvalidChainId(raw.to_string())),
    }
}

/// Metadata of a well known EVM chain.
pub fn known_evm_chain(chain_id: &str) -> Option<Chain> {
    let id = parse_chain_id(chain_id).ok()?;
    KNOWN_EVM_CHAINS
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(known, name)| Chain::evm(format!("{known:#x}"), *name))
}

/// A well known Solana cluster.
pub fn known_cluster(cluster: &str) -> Option<Chain> {
    let cluster = cluster_name(cluster);
    KNOWN_CLUSTERS
        .iter()
        .find(|(name, _)| *name == cluster)
        .map(|(name, url)| Chain::cluster(*name, *url))
}

/// Strips a `solana:` prefix and maps the Wallet Standard `mainnet` alias.
pub fn cluster_name(raw: &str) -> &str {
    match raw.strip_prefix("solana:").unwrap_or(raw) {
        "mainnet" => "mainnet-beta",
        other => other,
    }
}

/// Wallet Standard chain identifier of a cluster, e.g. `solana:devnet`.
pub fn wallet_standard_chain(cluster: &str) -> String {
    match cluster_name(cluster) {
        "mainnet-beta" => "solana:mainnet".to_string(),
        other => format!("solana:{other}"),
    }
}

/// Registered chains in insertion order plus the active EVM chain and Solana cluster.
#[derive(Clone, Debug, Default)]
pub struct ChainRegistry {
    chains: Vec<Chain>,
    active_chain: Option<String>,
    active_cluster: Option<String>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `chain`. Ids are normalized first, an already registered id is rejected and the
    /// existing entry stays as is.
    pub fn register(&mut self, mut chain: Chain) -> Result<&Chain, ValidationError> {
        chain.id = match chain.chain_type {
            ChainType::Evm => normalize_chain_id(&chain.id)?,
            ChainType::Solana => cluster_name(&chain.id).to_string(),
        };
        if self.get(chain.chain_type, &chain.id).is_some() {
            return Err(ValidationError::DuplicateChain(chain.id));
        }
        trace!(target: "wallet::chains", id = %chain.id, name = %chain.name, "registered chain");
        self.chains.push(chain);
        Ok(&self.chains[self.chains.len() - 1])
    }

    /// Registers the EVM chain if missing, using well known metadata when available.
    pub fn ensure_evm_chain(&mut self, chain_id: &str) -> Result<String, ValidationError> {
        let id = normalize_chain_id(chain_id)?;
        if self.get(ChainType::Evm, &id).is_none() {
            let chain = known_evm_chain(&id).unwrap_or_else(|| {
                let decimal = chain_id_to_decimal(&id).unwrap_or_default();
                Chain::evm(id.clone(), format!("Chain {decimal}"))
            });
            self.register(chain)?;
        }
        Ok(id)
    }

    /// Registers the cluster if missing.
    pub fn ensure_cluster(&mut self, cluster: &str) -> Result<String, ValidationError> {
        let name = cluster_name(cluster).to_string();
        if name.is_empty() {
            return Err(ValidationError::invalid_value("cluster", "empty cluster name"));
        }
        if self.get(ChainType::Solana, &name).is_none() {
            let chain = known_cluster(&name).unwrap_or_else(|| Chain {
                id: name.clone(),
                name: name.clone(),
                chain_type: ChainType::Solana,
                rpc_url: None,
            });
            self.register(chain)?;
        }
        Ok(name)
    }

    pub fn get(&self, chain_type: ChainType, id: &str) -> Option<&Chain> {
        let id = match chain_type {
            ChainType::Evm => normalize_chain_id(id).ok()?,
            ChainType::Solana => cluster_name(id).to_string(),
        };
        self.chains.iter().find(|chain| chain.chain_type == chain_type && chain.id == id)
    }

    pub fn evm_chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter().filter(|chain| chain.chain_type == ChainType::Evm)
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter().filter(|chain| chain.chain_type == ChainType::Solana)
    }

    pub fn active_chain_id(&self) -> Option<&str> {
        self.active_chain.as_deref()
    }

    pub fn active_chain(&self) -> Option<&Chain> {
        self.active_chain.as_deref().and_then(|id| self.get(ChainType::Evm, id))
    }

    /// Makes a registered EVM chain active.
    pub fn set_active_chain(&mut self, chain_id: &str) -> Result<String, ValidationError> {
        let id = normalize_chain_id(chain_id)?;
        if self.get(ChainType::Evm, &id).is_none() {
            return Err(ValidationError::UnknownChain(id));
        }
        self.active_chain = Some(id.clone());
        Ok(id)
    }

    pub fn active_cluster(&self) -> Option<&str> {
        self.active_cluster.as_deref()
    }

    /// Makes a registered cluster active.
    pub fn set_active_cluster(&mut self, cluster: &str) -> Result<String, ValidationError> {
        let name = cluster_name(cluster).to_string();
        if self.get(ChainType::Solana, &name).is_none() {
            return Err(ValidationError::UnknownChain(name));
        }
        self.active_cluster = Some(name.clone());
        Ok(name)
    }
}
