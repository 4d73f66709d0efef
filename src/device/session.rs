//! Tracked reader/card state shared between the hotplug bridge and the
//! command executor.
//!
//! The bridge is the only writer; the executor only reads. Both go through
//! one `Mutex<SessionState>` so an in-flight command never observes a
//! half-applied notification.

use std::time::{Duration, Instant};

use crate::cards::CardType;

/// The card currently sitting on the reader, as reported by a hotplug
/// notification. A fresh PC/SC connection is opened per command instead of
/// holding one here, which avoids stale-handle errors after replug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedCard {
    pub reader: String,
    pub atr: Vec<u8>,
    pub card_type: CardType,
}

#[derive(Debug)]
pub struct SessionState {
    reader: Option<String>,
    card: Option<TrackedCard>,
    last_refresh: Instant,
    min_poll_period: Duration,
}

impl SessionState {
    pub fn new(min_poll_period: Duration) -> Self {
        SessionState {
            reader: None,
            card: None,
            last_refresh: Instant::now(),
            min_poll_period,
        }
    }

    pub fn reader(&self) -> Option<&str> {
        self.reader.as_deref()
    }

    pub fn card(&self) -> Option<&TrackedCard> {
        self.card.as_ref()
    }

    /// Replaces any previously tracked reader wholesale.
    pub fn set_reader(&mut self, name: String) {
        self.reader = Some(name);
    }

    /// Clearing the reader also drops the card: a card is only ever
    /// tracked while its reader is.
    pub fn clear_reader(&mut self) {
        self.reader = None;
        self.card = None;
    }

    pub fn set_card(&mut self, card: TrackedCard) {
        debug_assert!(self.reader.is_some());
        self.card = Some(card);
    }

    pub fn clear_card(&mut self) {
        self.card = None;
    }

    /// Mark the state as just touched by a hotplug notification.
    /// `Instant` is monotonic, so the refresh stamp never goes backward.
    pub fn refreshed(&mut self) {
        self.last_refresh = Instant::now();
    }

    /// Time the executor still has to wait before transmitting, so a
    /// command never races a notification that is still settling.
    pub fn stall_remaining(&self, now: Instant) -> Duration {
        (self.last_refresh + self.min_poll_period).saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(reader: &str) -> TrackedCard {
        TrackedCard {
            reader: reader.to_owned(),
            atr: vec![0x3B, 0x8F],
            card_type: CardType::MifareClassic1k,
        }
    }

    #[test]
    fn card_implies_reader_at_every_state() {
        let mut state = SessionState::new(Duration::from_millis(100));
        assert!(state.card().is_none());

        state.set_reader("ACS ACR122U 00 00".to_owned());
        state.set_card(card("ACS ACR122U 00 00"));
        assert!(state.reader().is_some() || state.card().is_none());

        state.clear_reader();
        assert!(state.reader().is_none());
        assert!(state.card().is_none(), "card must not outlive its reader");
    }

    #[test]
    fn stall_counts_down_from_the_last_refresh() {
        let period = Duration::from_millis(100);
        let mut state = SessionState::new(period);
        state.refreshed();

        let remaining = state.stall_remaining(Instant::now());
        assert!(remaining <= period);
        assert!(remaining >= period - Duration::from_millis(50));

        // Once the period has fully elapsed no stall remains.
        let later = Instant::now() + period + period;
        assert_eq!(state.stall_remaining(later), Duration::ZERO);
    }
}
