//! Bootstrap token minting.

use super::context::StageContext;
use crate::artifacts::OneShotPolicyBuilder;
use crate::checkpoint::StageName;
use crate::core::identity::hex_serde;
use crate::core::{AssetId, AssetName, Integer, OutputRef, Quantity, TxId, Value};
use crate::errors::DeployError;
use crate::ledger::{LedgerError, Mint, Transaction, TxOutput};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Coin carried by the wallet output that receives freshly minted tokens.
const TOKEN_OUTPUT_COIN: u64 = 5_000_000;

/// A token to mint during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    /// Logical token name, used as the key in bindings and checkpoints.
    pub name: String,
    /// On-ledger asset name.
    pub asset_name: AssetName,
    /// Exact amount to mint.
    pub quantity: Quantity,
}

impl TokenDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, asset_name: AssetName, quantity: impl Into<Quantity>) -> Self {
        Self {
            name: name.into(),
            asset_name,
            quantity: quantity.into(),
        }
    }

    /// Creates a descriptor whose asset name is `name` followed by the run id.
    pub fn suffixed(
        name: impl Into<String>,
        run_id: &str,
        quantity: impl Into<Quantity>,
    ) -> Result<Self, DeployError> {
        let name = name.into();
        let asset_name = AssetName::suffixed(&name, run_id)
            .map_err(|e| DeployError::InvalidConfig(format!("token '{name}': {e}")))?;
        Ok(Self::new(name, asset_name, quantity))
    }
}

/// A minted bootstrap token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapToken {
    /// Logical token name.
    pub name: String,
    /// Policy and asset name.
    pub asset: AssetId,
    /// Minted amount.
    pub quantity: Quantity,
    /// Seed output the mint consumed.
    pub seed: OutputRef,
    /// Position of the token in the mint.
    pub index: u64,
    /// The one-shot policy script.
    #[serde(with = "hex_serde")]
    pub policy_script: Vec<u8>,
    /// The mint transaction.
    pub mint_tx: TxId,
}

/// Mints one-time tokens, each under its own one-shot policy.
#[derive(Debug)]
pub struct BootstrapMinter {
    ctx: StageContext,
    policies: OneShotPolicyBuilder,
    consumed: HashSet<OutputRef>,
}

impl BootstrapMinter {
    /// Creates a minter with the default one-shot policy template.
    #[must_use]
    pub fn new(ctx: StageContext) -> Self {
        Self {
            ctx,
            policies: OneShotPolicyBuilder::new(),
            consumed: HashSet::new(),
        }
    }

    /// Uses a different policy builder.
    #[must_use]
    pub fn with_policy_builder(mut self, policies: OneShotPolicyBuilder) -> Self {
        self.policies = policies;
        self
    }

    /// Returns true if this minter already spent the seed.
    #[must_use]
    pub fn is_consumed(&self, seed: &OutputRef) -> bool {
        self.consumed.contains(seed)
    }

    /// Creates a fresh wallet output to use as a mint seed.
    ///
    /// The seed is funded from the largest token-free wallet output holding
    /// at least `coin`; the remainder returns to the wallet at output 1.
    pub async fn prepare_seed(&self, coin: Quantity) -> Result<OutputRef, DeployError> {
        let wallet = self.ctx.ledger.wallet_address().await?;
        let funding = self
            .ctx
            .ledger
            .select_spendable_inputs(&wallet)
            .await?
            .into_iter()
            .filter(|u| u.output.value.has_no_assets() && u.output.value.coin >= coin)
            .max_by_key(|u| u.output.value.coin)
            .ok_or_else(|| {
                LedgerError::InsufficientFunds(format!("no token-free wallet output holds {coin} coin"))
            })?;
        debug!(input = %funding.out_ref, "Funding seed output");

        let mut builder = Transaction::builder()
            .spend(funding.out_ref, None)
            .pay_to(TxOutput::new(wallet, Value::coin(coin)))
            .label("prepare-seed");
        let change = funding.output.value.coin.checked_sub(coin).unwrap_or(Quantity::ZERO);
        if change > Quantity::ZERO {
            builder = builder.pay_to(TxOutput::new(wallet, Value::coin(change)));
        }
        let tx_id = self.ctx.submit_and_confirm(builder.build()).await?;
        let seed = OutputRef::new(tx_id, 0);
        info!(seed = %seed, "Seed output prepared");
        Ok(seed)
    }

    /// Mints every descriptor in one transaction that consumes `seed`.
    ///
    /// The bootstrap-tokens checkpoint is written before this returns.
    pub async fn mint(
        &mut self,
        seed: OutputRef,
        descriptors: &[TokenDescriptor],
    ) -> Result<BTreeMap<String, BootstrapToken>, DeployError> {
        if descriptors.is_empty() {
            return Err(DeployError::InvalidConfig("no tokens to mint".into()));
        }
        let mut names = HashSet::new();
        for descriptor in descriptors {
            if !names.insert(descriptor.name.as_str()) {
                return Err(DeployError::InvalidConfig(format!(
                    "token '{}' is listed more than once",
                    descriptor.name
                )));
            }
        }

        if self.consumed.contains(&seed) {
            return Err(DeployError::SeedConsumed { seed });
        }
        let seed_output = self.ctx.ledger.query_outputs_by_reference(&[seed]).await?;
        if !matches!(seed_output.first(), Some(Some(_))) {
            return Err(DeployError::SeedConsumed { seed });
        }

        let wallet = self.ctx.ledger.wallet_address().await?;
        let mut builder = Transaction::builder()
            .spend(seed, None)
            .label(StageName::BootstrapTokens.as_str());
        let mut payout = Value::coin(TOKEN_OUTPUT_COIN);
        let mut minted = Vec::with_capacity(descriptors.len());

        for (index, descriptor) in (0u64..).zip(descriptors) {
            let quantity = i128::try_from(descriptor.quantity.get())
                .map(Integer::new)
                .map_err(|_| DeployError::build(&descriptor.name, "quantity exceeds the integer range"))?;
            let policy = self
                .policies
                .policy(seed, index, quantity)
                .map_err(|e| DeployError::build(&descriptor.name, e.0))?;
            debug!(token = %descriptor.name, index, policy = %policy.identity, "Policy built");

            let asset = AssetId::new(policy.identity, descriptor.asset_name.clone());
            payout = payout.with_asset(asset.clone(), descriptor.quantity);
            builder = builder.mint(Mint {
                policy: policy.identity,
                asset_name: descriptor.asset_name.clone(),
                quantity: descriptor.quantity,
                script: Some(policy.code.clone()),
                redeemer: None,
            });
            minted.push((descriptor, index, asset, policy.code));
        }

        let tx = builder.pay_to(TxOutput::new(wallet, payout)).build();
        let tx_id = self.ctx.submit(tx).await?;
        // Once accepted the seed is gone, whatever confirmation reports.
        self.consumed.insert(seed);
        self.ctx.confirm(tx_id).await?;

        let tokens: BTreeMap<String, BootstrapToken> = minted
            .into_iter()
            .map(|(descriptor, index, asset, policy_script)| {
                let token = BootstrapToken {
                    name: descriptor.name.clone(),
                    asset,
                    quantity: descriptor.quantity,
                    seed,
                    index,
                    policy_script,
                    mint_tx: tx_id,
                };
                (descriptor.name.clone(), token)
            })
            .collect();

        self.ctx
            .checkpoints
            .save(StageName::BootstrapTokens, &tokens)
            .await?;
        info!(tx_id = %tx_id, tokens = tokens.len(), "Bootstrap tokens minted");
        Ok(tokens)
    }
}
