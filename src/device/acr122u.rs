//! The ACR122U device: blocking command execution, the built-in reader
//! commands and the two-phase MIFARE authentication handshake.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::cards::{CardGeometry, KeyType};
use crate::device::apdu::{ApduCommand, ApduResponse, Outcome};
use crate::device::session::SessionState;
use crate::device::transport::Transport;
use crate::utils::bytes_to_string;
use crate::{DriverError, DriverResult};

/// Pause between presence checks while waiting for a card.
const SPIN_INTERVAL: Duration = Duration::from_millis(10);

pub struct Acr122u {
    session: Arc<Mutex<SessionState>>,
    transport: Arc<dyn Transport>,
    /// Serializes whole execute/transmit/release sequences; card
    /// connections are transient, so two in-flight commands would
    /// otherwise race on the reader.
    command_lock: Mutex<()>,
    command_timeout: Duration,
}

impl Acr122u {
    pub fn new(
        session: Arc<Mutex<SessionState>>,
        transport: Arc<dyn Transport>,
        command_timeout: Duration,
    ) -> Self {
        Acr122u {
            session,
            transport,
            command_lock: Mutex::new(()),
            command_timeout,
        }
    }

    /// Transmit one command and return the raw response bytes.
    ///
    /// Waits out the minimum poll period since the last hotplug refresh,
    /// then spins until a card is present or `timeout` elapses. The
    /// transient card connection is dropped on every exit path; transport
    /// errors propagate as-is. On timeout the error names what was
    /// missing: reader, card, or the transmit itself.
    pub fn execute(&self, command: &ApduCommand, timeout: Duration) -> DriverResult<Vec<u8>> {
        let _guard = self.command_lock.lock().expect("command lock poisoned");

        let stall = self
            .session
            .lock()
            .expect("session state lock poisoned")
            .stall_remaining(Instant::now());
        if !stall.is_zero() {
            debug!("stalling {}ms after a hotplug refresh", stall.as_millis());
            thread::sleep(stall);
        }

        let query = command.to_bytes();
        let start = Instant::now();
        loop {
            let reader = {
                let session = self.session.lock().expect("session state lock poisoned");
                session.card().map(|card| card.reader.clone())
            };
            // The lock is not held across the transmit; the bridge keeps
            // applying notifications while we talk to the card.
            if let Some(reader) = reader {
                debug!("> {}", bytes_to_string(&query));
                let channel = self.transport.open(&reader)?;
                let response = channel.transmit(&query)?;
                debug!("< {}", bytes_to_string(&response));
                return Ok(response);
            }
            if start.elapsed() >= timeout {
                break;
            }
            thread::sleep(SPIN_INTERVAL);
        }

        let session = self.session.lock().expect("session state lock poisoned");
        if session.reader().is_none() {
            Err(DriverError::NoReaderConnected)
        } else if session.card().is_none() {
            Err(DriverError::NoCardPresent)
        } else {
            Err(DriverError::CommandTimeout)
        }
    }

    fn execute_classified(&self, command: &ApduCommand) -> DriverResult<ApduResponse> {
        let raw = self.execute(command, self.command_timeout)?;
        ApduResponse::from_raw(&raw)
    }

    /// The firmware response is a bare ASCII string, no status word.
    pub fn firmware_version(&self) -> DriverResult<String> {
        let raw = self.execute(&ApduCommand::firmware_version(), self.command_timeout)?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    pub fn get_uid(&self) -> DriverResult<ApduResponse> {
        self.execute_classified(&ApduCommand::get_uid())
    }

    pub fn get_ats(&self) -> DriverResult<ApduResponse> {
        self.execute_classified(&ApduCommand::get_ats())
    }

    /// Read `length` bytes of `block`. The block index is checked against
    /// the tracked card's geometry before anything is transmitted.
    pub fn read_block(&self, block: u8, length: u8) -> DriverResult<ApduResponse> {
        self.check_block_bounds(block)?;
        self.execute_classified(&ApduCommand::read_binary(block, length)?)
    }

    /// Two-phase authentication: load `key` into the volatile slot that
    /// matches `key_type`, then commit authentication for `block`.
    ///
    /// If the load phase does not come back `Success` its response is
    /// returned directly and the commit is never sent; committing against
    /// a key that failed to load is meaningless.
    pub fn auth(&self, key: &[u8; 6], block: u8, key_type: KeyType) -> DriverResult<ApduResponse> {
        self.check_block_bounds(block)?;

        let slot = key_type.slot();
        let load = self.execute_classified(&ApduCommand::load_auth_key(slot, key)?)?;
        if load.outcome != Outcome::Success {
            return Ok(load);
        }

        self.execute_classified(&ApduCommand::general_authenticate(block, key_type, slot)?)
    }

    /// Geometry of the tracked card, if one is present.
    pub fn card_geometry(&self) -> Option<CardGeometry> {
        let session = self.session.lock().expect("session state lock poisoned");
        session.card().map(|card| card.card_type.geometry())
    }

    /// Bounds are only enforceable when the card type is known; the
    /// unknown geometry's unbounded sentinel deliberately skips the
    /// check, since the card may still answer.
    fn check_block_bounds(&self, block: u8) -> DriverResult<()> {
        if let Some(geometry) = self.card_geometry() {
            if geometry.is_bounded() && !geometry.contains_block(block) {
                return Err(DriverError::ContractViolation(
                    "block index outside the card geometry",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cards::CardType;
    use crate::device::session::TrackedCard;
    use crate::device::transport::CardChannel;
    use std::collections::VecDeque;

    pub const READER: &str = "ACS ACR122U PICC Interface 00 00";

    /// Scripted transport: answers from a fixed queue and records every
    /// transmitted query.
    pub struct MockTransport {
        responses: Mutex<VecDeque<Vec<u8>>>,
        pub transmitted: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl MockTransport {
        pub fn new(responses: Vec<Vec<u8>>) -> Self {
            MockTransport {
                responses: Mutex::new(responses.into()),
                transmitted: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Transport for MockTransport {
        fn open(&self, _reader_name: &str) -> DriverResult<Box<dyn CardChannel>> {
            Ok(Box::new(MockChannel {
                response: self
                    .responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| hex!("63 00").to_vec()),
                transmitted: self.transmitted.clone(),
            }))
        }
    }

    struct MockChannel {
        response: Vec<u8>,
        transmitted: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl CardChannel for MockChannel {
        fn transmit(&self, query: &[u8]) -> DriverResult<Vec<u8>> {
            self.transmitted.lock().unwrap().push(query.to_vec());
            Ok(self.response.clone())
        }
    }

    pub fn session_with_card(card_type: CardType) -> Arc<Mutex<SessionState>> {
        let mut state = SessionState::new(Duration::ZERO);
        state.set_reader(READER.to_owned());
        state.set_card(TrackedCard {
            reader: READER.to_owned(),
            atr: Vec::new(),
            card_type,
        });
        Arc::new(Mutex::new(state))
    }

    fn device(
        session: Arc<Mutex<SessionState>>,
        transport: Arc<MockTransport>,
    ) -> Acr122u {
        Acr122u::new(session, transport, Duration::from_millis(100))
    }

    #[test]
    fn get_uid_parses_data_and_status_word() {
        let session = session_with_card(CardType::MifareClassic1k);
        let transport = Arc::new(MockTransport::new(vec![hex!("AA BB CC DD 90 00").to_vec()]));
        let device = device(session, transport.clone());

        let response = device.get_uid().unwrap();
        assert_eq!(response.data, hex!("AA BB CC DD"));
        assert_eq!(response.outcome, Outcome::Success);
        assert_eq!(
            transport.transmitted.lock().unwrap().as_slice(),
            &[hex!("FF CA 00 00 00").to_vec()]
        );
    }

    #[test]
    fn auth_short_circuits_when_the_key_fails_to_load() {
        let session = session_with_card(CardType::MifareClassic1k);
        let transport = Arc::new(MockTransport::new(vec![hex!("63 00").to_vec()]));
        let device = device(session, transport.clone());

        let response = device
            .auth(&hex!("FF FF FF FF FF FF"), 4, KeyType::A)
            .unwrap();
        assert_eq!(response.outcome, Outcome::Failed);

        // Only the load command went out, never the commit.
        let transmitted = transport.transmitted.lock().unwrap();
        assert_eq!(transmitted.len(), 1);
        assert_eq!(transmitted[0][..2], hex!("FF 82"));
    }

    #[test]
    fn auth_commits_with_the_load_slot() {
        let session = session_with_card(CardType::MifareClassic1k);
        let transport = Arc::new(MockTransport::new(vec![
            hex!("90 00").to_vec(),
            hex!("90 00").to_vec(),
        ]));
        let device = device(session, transport.clone());

        let response = device
            .auth(&hex!("FF FF FF FF FF FF"), 4, KeyType::B)
            .unwrap();
        assert!(response.is_success());

        let transmitted = transport.transmitted.lock().unwrap();
        assert_eq!(
            transmitted.as_slice(),
            &[
                hex!("FF 82 00 01 06 FF FF FF FF FF FF").to_vec(),
                hex!("FF 86 00 00 05 01 00 04 61 01").to_vec(),
            ]
        );
    }

    #[test]
    fn out_of_bounds_block_fails_before_any_transmit() {
        let session = session_with_card(CardType::MifareClassic1k);
        let transport = Arc::new(MockTransport::new(Vec::new()));
        let device = device(session, transport.clone());

        assert_eq!(
            device.read_block(70, 16),
            Err(DriverError::ContractViolation(
                "block index outside the card geometry"
            ))
        );
        assert_eq!(
            device.auth(&hex!("FF FF FF FF FF FF"), 70, KeyType::A),
            Err(DriverError::ContractViolation(
                "block index outside the card geometry"
            ))
        );
        assert!(transport.transmitted.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_card_type_skips_bounds_checking() {
        let session = session_with_card(CardType::Unknown);
        let transport = Arc::new(MockTransport::new(vec![hex!("6A 81").to_vec()]));
        let device = device(session, transport);

        let response = device.read_block(200, 16).unwrap();
        assert_eq!(response.outcome, Outcome::NotSupported);
    }

    #[test]
    fn timeout_without_a_reader_reports_no_reader() {
        let session = Arc::new(Mutex::new(SessionState::new(Duration::ZERO)));
        let transport = Arc::new(MockTransport::new(Vec::new()));
        let device = Acr122u::new(session, transport, Duration::from_millis(100));

        let start = Instant::now();
        let result = device.execute(&ApduCommand::get_uid(), Duration::from_millis(50));
        assert_eq!(result, Err(DriverError::NoReaderConnected));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn timeout_with_a_reader_but_no_card_reports_no_card() {
        let mut state = SessionState::new(Duration::ZERO);
        state.set_reader(READER.to_owned());
        let session = Arc::new(Mutex::new(state));
        let transport = Arc::new(MockTransport::new(Vec::new()));
        let device = Acr122u::new(session, transport, Duration::from_millis(100));

        let result = device.execute(&ApduCommand::get_uid(), Duration::from_millis(50));
        assert_eq!(result, Err(DriverError::NoCardPresent));
    }

    #[test]
    fn execute_waits_out_the_minimum_poll_period() {
        let session = {
            let mut state = SessionState::new(Duration::from_millis(80));
            state.set_reader(READER.to_owned());
            state.set_card(TrackedCard {
                reader: READER.to_owned(),
                atr: Vec::new(),
                card_type: CardType::MifareClassic1k,
            });
            state.refreshed();
            Arc::new(Mutex::new(state))
        };
        let transport = Arc::new(MockTransport::new(vec![hex!("90 00").to_vec()]));
        let device = Acr122u::new(session, transport, Duration::from_millis(500));

        let start = Instant::now();
        device
            .execute(&ApduCommand::get_uid(), Duration::from_millis(500))
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
