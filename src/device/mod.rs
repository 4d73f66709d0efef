pub mod acr122u;
pub mod apdu;
pub mod key_search;
pub mod monitor;
pub mod session;
pub mod transport;

pub use acr122u::Acr122u;
pub use apdu::{ApduCommand, ApduResponse, Outcome};
pub use key_search::FoundKey;
pub use monitor::{CardEvent, HotplugBridge};
pub use session::{SessionState, TrackedCard};
pub use transport::{CardChannel, PcscTransport, Transport};
