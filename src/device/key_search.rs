//! Brute-force sweep of the default key catalog over every block and key
//! type of a MIFARE Classic card.
//!
//! This tries each catalog key in order until one authenticates, then
//! moves on to the next block/key-type combination. No cross-sector key
//! reuse is exploited and no cryptanalytic shortcuts are taken; over a
//! serial transport this is far too slow for unknown keys, but it is the
//! mechanism available without touching crypto-1.

use log::{debug, info};

use crate::cards::mifare_classic::{self, is_sector_trailer};
use crate::cards::{CardGeometry, KeyType};
use crate::device::acr122u::Acr122u;
use crate::device::apdu::Outcome;
use crate::utils::bytes_to_string;
use crate::{DriverError, DriverResult};

/// A default key that authenticated one block/key-type combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundKey {
    pub block: u8,
    pub key_type: KeyType,
    pub key: [u8; 6],
}

/// Try the default key catalog against every block and both key types.
/// The first catalog key that authenticates a combination is reported;
/// later catalog keys are not tried for it.
pub fn search_default_keys(
    device: &Acr122u,
    geometry: &CardGeometry,
) -> DriverResult<Vec<FoundKey>> {
    if !geometry.is_bounded() {
        return Err(DriverError::ContractViolation(
            "cannot sweep a card with unknown geometry",
        ));
    }

    let mut found = Vec::new();
    for block in 0..geometry.block_count {
        let block = block as u8;
        for key_type in KeyType::BOTH {
            for key in mifare_classic::default_keys() {
                debug!(
                    "trying key {} on block {block} ({key_type:?})",
                    bytes_to_string(key)
                );
                let response = device.auth(key, block, key_type)?;
                if response.outcome == Outcome::Success {
                    info!(
                        "block {block:3} {key_type:?} unlocked by {}{}",
                        bytes_to_string(key),
                        if is_sector_trailer(block) {
                            " (sector trailer)"
                        } else {
                            ""
                        }
                    );
                    found.push(FoundKey {
                        block,
                        key_type,
                        key: *key,
                    });
                    break;
                }
            }
        }
    }
    Ok(found)
}
