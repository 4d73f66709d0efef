//! APDU command templates and status word classification for the ACR122U.
//!
//! Every command is a fixed 5 byte header `[class, ins, p1, p2, le]`
//! optionally followed by a payload. Responses end in the two status word
//! bytes SW1/SW2.

use crate::cards::KeyType;
use crate::utils::bytes_to_string;
use crate::{DriverError, DriverResult};

/// Closed classification of a status word pair.
///
/// `Success` is the only outcome callers treat as truthy; the rest are
/// ordinary protocol results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
    NotSupported,
    Unknown,
}

impl Outcome {
    /// Total over all byte pairs, never fails.
    pub fn classify(sw1: u8, sw2: u8) -> Self {
        match (sw1, sw2) {
            (0x90, 0x00) => Outcome::Success,
            (0x63, 0x00) => Outcome::Failed,
            (0x6A, 0x81) => Outcome::NotSupported,
            _ => Outcome::Unknown,
        }
    }
}

/// An immutable APDU, built once per command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    class: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    le: u8,
    payload: Vec<u8>,
}

impl ApduCommand {
    fn new(header: [u8; 5], payload: Vec<u8>) -> Self {
        ApduCommand {
            class: header[0],
            ins: header[1],
            p1: header[2],
            p2: header[3],
            le: header[4],
            payload,
        }
    }

    /// `GET DATA` for the card UID.
    pub fn get_uid() -> Self {
        Self::new(hex!("FF CA 00 00 00"), Vec::new())
    }

    /// `GET DATA` for the answer-to-select.
    pub fn get_ats() -> Self {
        Self::new(hex!("FF CA 01 00 00"), Vec::new())
    }

    /// Reader firmware version pseudo-APDU. The ACR122U answers this one
    /// with a bare ASCII string, without a trailing status word.
    pub fn firmware_version() -> Self {
        Self::new(hex!("FF 00 48 00 00"), Vec::new())
    }

    /// Load a 6 byte authentication key into a volatile reader slot.
    pub fn load_auth_key(slot: u8, key: &[u8]) -> DriverResult<Self> {
        if key.len() != 6 {
            return Err(DriverError::ContractViolation(
                "authentication keys are exactly 6 bytes",
            ));
        }
        if slot > 1 {
            return Err(DriverError::ContractViolation(
                "the reader has volatile key slots 0 and 1",
            ));
        }
        Ok(Self::new([0xFF, 0x82, 0x00, slot, 0x06], key.to_vec()))
    }

    /// Commit authentication of `block` against a previously loaded key.
    /// `slot` must be the slot the key was loaded into.
    pub fn general_authenticate(block: u8, key_type: KeyType, slot: u8) -> DriverResult<Self> {
        if slot > 1 {
            return Err(DriverError::ContractViolation(
                "the reader has volatile key slots 0 and 1",
            ));
        }
        Ok(Self::new(
            hex!("FF 86 00 00 05"),
            vec![0x01, 0x00, block, key_type.opcode(), slot],
        ))
    }

    /// Read up to 16 bytes of one memory block.
    pub fn read_binary(block: u8, length: u8) -> DriverResult<Self> {
        if length > 16 {
            return Err(DriverError::ContractViolation(
                "MIFARE Classic blocks hold at most 16 bytes",
            ));
        }
        Ok(Self::new([0xFF, 0xB0, 0x00, block, length], Vec::new()))
    }

    /// Wire form: 5 byte header followed by the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.payload.len());
        bytes.extend_from_slice(&[self.class, self.ins, self.p1, self.p2, self.le]);
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// A transmit result split into data and classified status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
    pub outcome: Outcome,
}

impl ApduResponse {
    /// Split a raw transmit buffer into data and the trailing status word.
    pub fn from_raw(raw: &[u8]) -> DriverResult<Self> {
        if raw.len() < 2 {
            return Err(DriverError::InvariantBreach(
                "response shorter than a status word",
            ));
        }
        let (data, status) = raw.split_at(raw.len() - 2);
        Ok(ApduResponse {
            data: data.to_vec(),
            sw1: status[0],
            sw2: status[1],
            outcome: Outcome::classify(status[0], status[1]),
        })
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

impl std::fmt::Display for ApduResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{:02X} {:02X}] {:?}",
            bytes_to_string(&self.data),
            self.sw1,
            self.sw2,
            self.outcome
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_is_total_over_all_status_words() {
        for sw1 in 0..=0xFFu8 {
            for sw2 in 0..=0xFFu8 {
                let outcome = Outcome::classify(sw1, sw2);
                match (sw1, sw2) {
                    (0x90, 0x00) => assert_eq!(outcome, Outcome::Success),
                    (0x63, 0x00) => assert_eq!(outcome, Outcome::Failed),
                    (0x6A, 0x81) => assert_eq!(outcome, Outcome::NotSupported),
                    _ => assert_eq!(outcome, Outcome::Unknown),
                }
            }
        }
    }

    #[test]
    fn classify_is_referentially_stable() {
        assert_eq!(Outcome::classify(0x90, 0x00), Outcome::Success);
        assert_eq!(Outcome::classify(0x90, 0x00), Outcome::Success);
    }

    #[test]
    fn fixed_templates_encode_exactly() {
        assert_eq!(ApduCommand::get_uid().to_bytes(), hex!("FF CA 00 00 00"));
        assert_eq!(ApduCommand::get_ats().to_bytes(), hex!("FF CA 01 00 00"));
        assert_eq!(
            ApduCommand::firmware_version().to_bytes(),
            hex!("FF 00 48 00 00")
        );
    }

    #[test]
    fn load_key_is_header_plus_key() {
        let key = hex!("A0 B0 C0 D0 E0 F0");
        let cmd = ApduCommand::load_auth_key(1, &key).unwrap().to_bytes();
        assert_eq!(cmd, hex!("FF 82 00 01 06 A0 B0 C0 D0 E0 F0"));
        assert_eq!(cmd.len(), 5 + key.len());
    }

    #[test]
    fn load_key_rejects_bad_arguments() {
        assert_eq!(
            ApduCommand::load_auth_key(0, &[0xFF; 5]),
            Err(DriverError::ContractViolation(
                "authentication keys are exactly 6 bytes"
            ))
        );
        assert!(ApduCommand::load_auth_key(2, &[0xFF; 6]).is_err());
    }

    #[test]
    fn general_authenticate_encodes_key_type_and_slot() {
        let cmd = ApduCommand::general_authenticate(0x3F, KeyType::B, 1)
            .unwrap()
            .to_bytes();
        assert_eq!(cmd, hex!("FF 86 00 00 05 01 00 3F 61 01"));

        let cmd = ApduCommand::general_authenticate(0x00, KeyType::A, 0)
            .unwrap()
            .to_bytes();
        assert_eq!(cmd, hex!("FF 86 00 00 05 01 00 00 60 00"));
    }

    #[test]
    fn read_binary_bounds_length() {
        let cmd = ApduCommand::read_binary(4, 16).unwrap().to_bytes();
        assert_eq!(cmd, hex!("FF B0 00 04 10"));
        assert!(ApduCommand::read_binary(4, 17).is_err());
    }

    #[test]
    fn response_split_and_classification() {
        let response = ApduResponse::from_raw(&hex!("AA BB CC DD 90 00")).unwrap();
        assert_eq!(response.data, hex!("AA BB CC DD"));
        assert_eq!(response.outcome, Outcome::Success);
        assert!(response.is_success());

        let response = ApduResponse::from_raw(&hex!("63 00")).unwrap();
        assert!(response.data.is_empty());
        assert_eq!(response.outcome, Outcome::Failed);

        assert_eq!(
            ApduResponse::from_raw(&[0x90]),
            Err(DriverError::InvariantBreach(
                "response shorter than a status word"
            ))
        );
    }
}
