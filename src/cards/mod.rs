pub mod mifare_classic;

pub use mifare_classic::{CardGeometry, CardType, KeyType};
