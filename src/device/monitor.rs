//! Hotplug notification bridge and the PC/SC status-change monitor thread.
//!
//! The bridge applies reader/card add/remove deltas to the shared
//! [`SessionState`]; it is transport-free so tests can drive it directly.
//! [`run`] spawns the background thread that watches PC/SC for those
//! deltas and feeds them in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use pcsc::{Context, ReaderState, Scope, State, PNP_NOTIFICATION};

use crate::cards::mifare_classic::{describe, type_id_from_atr};
use crate::cards::CardType;
use crate::device::session::{SessionState, TrackedCard};
use crate::utils::bytes_to_string;

/// A card insertion or removal as reported by the monitor. Carries the
/// name of the reader it happened on and the card's answer-to-reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardEvent {
    pub reader: String,
    pub atr: Vec<u8>,
}

pub struct HotplugBridge {
    session: Arc<Mutex<SessionState>>,
    filter: String,
}

impl HotplugBridge {
    /// `filter` is a reader-name substring; the empty string matches all.
    pub fn new(session: Arc<Mutex<SessionState>>, filter: String) -> Self {
        HotplugBridge { session, filter }
    }

    fn matches(&self, reader_name: &str) -> bool {
        self.filter.is_empty() || reader_name.contains(&self.filter)
    }

    /// Apply a reader-list-changed notification. A matching added reader
    /// replaces the tracked one wholesale; a matching removed reader
    /// clears it (and with it any tracked card).
    pub fn reader_list_changed(&self, added: &[String], removed: &[String]) {
        let mut session = self.session.lock().expect("session state lock poisoned");
        for name in added {
            if self.matches(name) {
                info!("added reader {name}");
                session.set_reader(name.clone());
            }
        }
        for name in removed {
            if self.matches(name) {
                info!("removed reader {name}");
                session.clear_reader();
            }
        }
        session.refreshed();
    }

    /// Apply a card-list-changed notification. Only meaningful while a
    /// reader is tracked. The hardware handles one tag at a time, so more
    /// than one add or remove per notification is an invariant breach:
    /// reported and the extra entries ignored.
    pub fn card_list_changed(&self, added: &[CardEvent], removed: &[CardEvent]) {
        let mut session = self.session.lock().expect("session state lock poisoned");
        let tracked_reader = match session.reader() {
            Some(reader) => reader.to_owned(),
            None => {
                session.refreshed();
                return;
            }
        };

        let added: Vec<&CardEvent> = added
            .iter()
            .filter(|event| event.reader == tracked_reader)
            .collect();
        if added.len() > 1 {
            error!(
                "invariant breach: {} cards added in one notification, keeping the first",
                added.len()
            );
        }
        if let Some(event) = added.first() {
            let card_type = match type_id_from_atr(&event.atr) {
                Some(type_id) => {
                    info!(
                        "adding card '{}' (atr {})",
                        describe(type_id),
                        bytes_to_string(&event.atr)
                    );
                    CardType::identify(type_id)
                }
                None => {
                    warn!(
                        "card atr too short to carry a type id: {}",
                        bytes_to_string(&event.atr)
                    );
                    CardType::Unknown
                }
            };
            session.set_card(TrackedCard {
                reader: event.reader.clone(),
                atr: event.atr.clone(),
                card_type,
            });
        }

        let removed: Vec<&CardEvent> = removed
            .iter()
            .filter(|event| {
                session
                    .card()
                    .map(|card| card.reader == event.reader && card.atr == event.atr)
                    .unwrap_or(false)
            })
            .collect();
        if removed.len() > 1 {
            error!(
                "invariant breach: {} cards removed in one notification, keeping the first",
                removed.len()
            );
        }
        if removed.first().is_some() {
            info!("removing card");
            session.clear_card();
        }

        session.refreshed();
    }
}

/// Watch PC/SC for reader and card status changes and feed the deltas to
/// the bridge. Runs until the process exits.
pub fn run(bridge: HotplugBridge) {
    thread::spawn(move || {
        let ctx = match Context::establish(Scope::User) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("Cannot connect to pcsc service! ({e:?})");
                return;
            }
        };

        let mut readers_buf = [0; 2048];
        let mut reader_states = vec![
            // Listen for reader insertions/removals, if supported.
            ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE),
        ];

        // ATR of the card currently present on each reader.
        let mut current_cards: HashMap<String, Vec<u8>> = HashMap::new();

        loop {
            // Remove dead readers.
            fn is_dead(rs: &ReaderState) -> bool {
                rs.event_state().intersects(State::UNKNOWN | State::IGNORE)
            }
            let dead: Vec<String> = reader_states
                .iter()
                .filter(|rs| is_dead(rs))
                .map(|rs| rs.name().to_string_lossy().into_owned())
                .collect();
            for name in &dead {
                if let Some(atr) = current_cards.remove(name) {
                    bridge.card_list_changed(
                        &[],
                        &[CardEvent {
                            reader: name.clone(),
                            atr,
                        }],
                    );
                }
            }
            if !dead.is_empty() {
                bridge.reader_list_changed(&[], &dead);
            }
            reader_states.retain(|rs| !is_dead(rs));

            // Add new readers.
            let names = match ctx.list_readers(&mut readers_buf) {
                Ok(names) => names,
                Err(e) => {
                    error!("failed to list readers ({e:?})");
                    thread::sleep(Duration::from_millis(500));
                    continue;
                }
            };
            let mut added = Vec::new();
            for name in names {
                if !reader_states.iter().any(|rs| rs.name() == name) {
                    added.push(name.to_string_lossy().into_owned());
                    reader_states.push(ReaderState::new(name, State::UNAWARE));
                }
            }
            if !added.is_empty() {
                bridge.reader_list_changed(&added, &[]);
            }

            // Update the view of the state to wait on.
            for rs in &mut reader_states {
                rs.sync_current_state();
            }

            // Wait until the state changes.
            if ctx
                .get_status_change(Some(Duration::from_millis(500)), &mut reader_states)
                .is_ok()
            {
                for rs in &reader_states {
                    if rs.name() == PNP_NOTIFICATION() {
                        continue;
                    }
                    let name = rs.name().to_string_lossy().into_owned();
                    if rs.event_state().contains(State::PRESENT) {
                        if current_cards.contains_key(&name) {
                            continue;
                        }
                        let atr = rs.atr().to_vec();
                        current_cards.insert(name.clone(), atr.clone());
                        bridge.card_list_changed(&[CardEvent { reader: name, atr }], &[]);
                    } else if let Some(atr) = current_cards.remove(&name) {
                        bridge.card_list_changed(&[], &[CardEvent { reader: name, atr }]);
                    }
                }
            }
        }
    });
}
