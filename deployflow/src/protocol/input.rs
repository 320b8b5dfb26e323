//! Initial DAO state and its datum encodings.

use crate::core::identity::hex_serde;
use crate::core::{AssetId, AssetName, Datum, Integer, OutputRef, Quantity, ScriptHash};
use crate::errors::DeployError;
use serde::{Deserialize, Serialize};

/// Policy of the SPLASH token on the target network.
pub const SPLASH_POLICY: &str = "adf2425c138138efce80fd0b2ed8f227caf052f9ec44b8a92e942dfa";
/// SPLASH asset name.
pub const SPLASH_ASSET_NAME: &str = "SPLASH";

/// Voting-escrow state locked with the initial escrow entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingEscrowState {
    /// Lock deadline.
    pub locked_until: Integer,
    /// Owner verification key.
    #[serde(with = "hex_serde")]
    pub owner: Vec<u8>,
    /// Maximum execution fee.
    pub max_ex_fee: Integer,
    /// Escrow version.
    pub version: Integer,
    /// Last epoch weighting power was claimed for.
    pub last_wp_epoch: Integer,
    /// Last governance-power deadline.
    pub last_gp_deadline: Integer,
}

impl VotingEscrowState {
    /// `{Def(locked_until), PubKey(owner), max_ex_fee, version, last_wp_epoch, last_gp_deadline}`.
    #[must_use]
    pub fn to_datum(&self) -> Datum {
        Datum::constr(
            0,
            vec![
                Datum::constr(0, vec![Datum::Int(self.locked_until)]),
                Datum::constr(0, vec![Datum::bytes(self.owner.clone())]),
                Datum::Int(self.max_ex_fee),
                Datum::Int(self.version),
                Datum::Int(self.last_wp_epoch),
                Datum::Int(self.last_gp_deadline),
            ],
        )
    }
}

/// Farm factory counter and seed data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmFactoryState {
    /// Id of the most recently created farm.
    pub last_farm_id: Integer,
    /// Opaque seed data handed to new farms.
    #[serde(with = "hex_serde")]
    pub farm_seed_data: Vec<u8>,
}

impl FarmFactoryState {
    /// Position of `last_farm_id` in the encoded datum.
    pub const SEQUENCE_FIELD: usize = 0;

    /// `{last_farm_id, farm_seed_data}`.
    #[must_use]
    pub fn to_datum(&self) -> Datum {
        Datum::constr(
            0,
            vec![
                Datum::Int(self.last_farm_id),
                Datum::bytes(self.farm_seed_data.clone()),
            ],
        )
    }
}

/// Weighting-poll factory state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpFactoryState {
    /// Epoch of the last poll.
    pub last_poll_epoch: Integer,
    /// Farm identifiers taking part in polls.
    pub active_farms: Vec<String>,
}

impl WpFactoryState {
    /// `{last_poll_epoch, [farm names as bytes]}`.
    #[must_use]
    pub fn to_datum(&self) -> Datum {
        Datum::constr(
            0,
            vec![
                Datum::Int(self.last_poll_epoch),
                Datum::List(
                    self.active_farms
                        .iter()
                        .map(|f| Datum::bytes(f.as_bytes().to_vec()))
                        .collect(),
                ),
            ],
        )
    }
}

/// An asset accepted for voting-escrow locks, with its exchange rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedAsset {
    /// The accepted token.
    pub asset: AssetId,
    /// Rate numerator.
    pub num: Integer,
    /// Rate denominator.
    pub den: Integer,
}

fn accepted_assets_datum(assets: &[AcceptedAsset]) -> Datum {
    Datum::Map(
        assets
            .iter()
            .map(|a| {
                (
                    Datum::constr(
                        0,
                        vec![
                            Datum::bytes(a.asset.policy.as_bytes().to_vec()),
                            Datum::bytes(a.asset.name.as_bytes().to_vec()),
                        ],
                    ),
                    Datum::constr(0, vec![Datum::Int(a.num), Datum::Int(a.den)]),
                )
            })
            .collect(),
    )
}

/// Everything the DAO deployment needs besides compiled validators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaoInput {
    /// Deployment run suffix, appended to suffixed token names.
    pub run_id: String,
    /// The SPLASH token.
    pub splash: AssetId,
    /// Start of epoch zero.
    pub zeroth_epoch_start: Integer,
    /// Base coin amount of entity outputs.
    pub entity_coin: Quantity,
    /// Governance token supply.
    pub gt_quantity: Quantity,
    /// Initial inflation epoch.
    pub inflation_epoch: Integer,
    /// Initial voting-escrow state.
    pub voting_escrow: VotingEscrowState,
    /// Initial farm factory state.
    pub farm_factory: FarmFactoryState,
    /// Initial weighting-poll factory state.
    pub wp_factory: WpFactoryState,
    /// Assets the ve factory accepts.
    pub accepted_assets: Vec<AcceptedAsset>,
    /// Assets accepted under the legacy rules.
    #[serde(default)]
    pub legacy_accepted_assets: Vec<AcceptedAsset>,
    /// Seed for the token mint; prepared on demand when absent.
    #[serde(default)]
    pub seed: Option<OutputRef>,
}

impl DaoInput {
    /// Testnet defaults for a run, owned by `owner`.
    pub fn new(run_id: impl Into<String>, owner: Vec<u8>) -> Result<Self, DeployError> {
        let policy = ScriptHash::from_hex(SPLASH_POLICY)
            .map_err(|e| DeployError::InvalidConfig(format!("SPLASH policy: {e}")))?;
        let name = AssetName::utf8(SPLASH_ASSET_NAME)
            .map_err(|e| DeployError::InvalidConfig(format!("SPLASH asset name: {e}")))?;
        let splash = AssetId::new(policy, name);

        Ok(Self {
            run_id: run_id.into(),
            splash: splash.clone(),
            zeroth_epoch_start: Integer::new(1000),
            entity_coin: Quantity::new(10_000_000),
            gt_quantity: Quantity::new(45_000_000_000_000_000),
            inflation_epoch: Integer::new(1),
            voting_escrow: VotingEscrowState {
                locked_until: Integer::new(1),
                owner,
                max_ex_fee: Integer::new(100_000),
                version: Integer::new(1),
                last_wp_epoch: Integer::new(1),
                last_gp_deadline: Integer::new(1),
            },
            farm_factory: FarmFactoryState {
                last_farm_id: Integer::new(10_007_199_254_740_991),
                // CBOR encoding of an empty byte string.
                farm_seed_data: vec![0x40],
            },
            wp_factory: WpFactoryState {
                last_poll_epoch: Integer::ZERO,
                active_farms: vec!["farm0".into(), "f1".into()],
            },
            accepted_assets: vec![AcceptedAsset {
                asset: splash,
                num: Integer::new(100),
                den: Integer::new(1000),
            }],
            legacy_accepted_assets: Vec::new(),
            seed: None,
        })
    }

    /// Loads an input document.
    pub fn from_json(json: &str) -> Result<Self, DeployError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The ve factory datum: accepted and legacy accepted assets.
    #[must_use]
    pub fn ve_factory_datum(&self) -> Datum {
        Datum::constr(
            0,
            vec![
                accepted_assets_datum(&self.accepted_assets),
                accepted_assets_datum(&self.legacy_accepted_assets),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_farm_id_beyond_f64_survives_json() {
        let input = DaoInput::new("_22", vec![0xab; 32]).unwrap();
        let json = serde_json::to_string(&input).unwrap();
        assert!(json.contains("\"10007199254740991\""));

        let back = DaoInput::from_json(&json).unwrap();
        assert_eq!(back.farm_factory.last_farm_id, Integer::new(10_007_199_254_740_991));
        assert_eq!(back, input);
    }

    #[test]
    fn test_voting_escrow_datum_shape() {
        let input = DaoInput::new("r", vec![1, 2]).unwrap();
        let datum = input.voting_escrow.to_datum();
        assert_eq!(datum.field(0), Some(&Datum::constr(0, vec![Datum::int(1i64)])));
        assert_eq!(datum.field(2).and_then(Datum::as_int), Some(Integer::new(100_000)));
    }

    #[test]
    fn test_ve_factory_datum_lists_splash() {
        let input = DaoInput::new("r", vec![]).unwrap();
        let Some(Datum::Map(entries)) = input.ve_factory_datum().field(0).cloned() else {
            panic!("accepted assets must be a map");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].0.field(1),
            Some(&Datum::bytes(SPLASH_ASSET_NAME.as_bytes().to_vec()))
        );
    }
}
