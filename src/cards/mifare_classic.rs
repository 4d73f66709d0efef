//! MIFARE Classic memory geometry and the well-known default keys.
//!
//! MIFARE Classic memory is divided into 16 byte blocks grouped into
//! sectors. The 1K variant has 16 sectors of 4 blocks (64 blocks total),
//! the 4K variant has 32 sectors of 4 blocks plus 8 sectors of 16 blocks
//! (256 blocks total). The last block of each sector is the trailer and
//! holds KEY_A, the access conditions and KEY_B.

/// Sentinel block count for cards whose type could not be determined.
/// Using it disables block bounds checking for that card.
pub const UNBOUNDED_BLOCKS: u32 = u32::MAX;

/// Default authentication keys found in
/// https://awesomeopensource.com/project/XaviTorello/mifare-classic-toolkit
pub const DEFAULT_KEYS: [[u8; 6]; 16] = [
    hex!("FF FF FF FF FF FF"),
    hex!("A0 B0 C0 D0 E0 F0"),
    hex!("A1 B1 C1 D1 E1 F1"),
    hex!("A0 A1 A2 A3 A4 A5"),
    hex!("B0 B1 B2 B3 B4 B5"),
    hex!("4D 3A 99 C3 51 DD"),
    hex!("1A 98 2C 7E 45 9A"),
    hex!("00 00 00 00 00 00"),
    hex!("AA BB CC DD EE FF"),
    hex!("D3 F7 D3 F7 D3 F7"),
    hex!("AA BB CC DD EE FF"),
    hex!("71 4C 5C 88 6E 97"),
    hex!("58 7E E5 F9 35 0F"),
    hex!("A0 47 8C C3 90 91"),
    hex!("53 3C B6 C7 23 F6"),
    hex!("8F D0 A4 F2 56 E9"),
];

/// Restartable iteration over the default key catalog, in catalog order.
pub fn default_keys() -> impl Iterator<Item = &'static [u8; 6]> {
    DEFAULT_KEYS.iter()
}

/// One of the two independent authentication keys protecting a sector.
///
/// By convention the reader's volatile key slot used for a key equals the
/// key type it will authenticate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    A,
    B,
}

impl KeyType {
    pub const BOTH: [KeyType; 2] = [KeyType::A, KeyType::B];

    /// Volatile reader memory slot assigned to this key type.
    pub fn slot(self) -> u8 {
        match self {
            KeyType::A => 0,
            KeyType::B => 1,
        }
    }

    /// `GENERAL AUTHENTICATE` key structure byte (0x60 = TYPE_A, 0x61 = TYPE_B).
    pub fn opcode(self) -> u8 {
        0x60 + self.slot()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardGeometry {
    pub label: &'static str,
    pub block_count: u32,
}

impl CardGeometry {
    pub fn is_bounded(&self) -> bool {
        self.block_count != UNBOUNDED_BLOCKS
    }

    pub fn contains_block(&self, block: u8) -> bool {
        u32::from(block) < self.block_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    MifareClassic1k,
    MifareClassic4k,
    Unknown,
}

impl CardType {
    /// Resolve the card type from the 2 byte type code carried in the ATR.
    pub fn identify(type_id: [u8; 2]) -> Self {
        match type_id {
            [0x00, 0x01] => CardType::MifareClassic1k,
            [0x00, 0x02] => CardType::MifareClassic4k,
            _ => CardType::Unknown,
        }
    }

    pub fn geometry(self) -> CardGeometry {
        match self {
            CardType::MifareClassic1k => CardGeometry {
                label: "MIFARE Classic 1K",
                block_count: 0x40,
            },
            CardType::MifareClassic4k => CardGeometry {
                label: "MIFARE Classic 4K",
                block_count: 0x100,
            },
            CardType::Unknown => CardGeometry {
                label: "unknown",
                block_count: UNBOUNDED_BLOCKS,
            },
        }
    }
}

/// Human readable name for an ATR type code. Covers card families the
/// ACR122U reports but this crate does not model beyond the label.
pub fn describe(type_id: [u8; 2]) -> &'static str {
    match type_id {
        [0x00, 0x01] => "MIFARE Classic 1K",
        [0x00, 0x02] => "MIFARE Classic 4K",
        [0x00, 0x03] => "MIFARE Ultralight",
        [0x00, 0x26] => "MIFARE Mini",
        [0xF0, 0x04] => "Topaz and Jewel",
        [0xF0, 0x11] => "FeliCa 212K",
        [0xF0, 0x12] => "FeliCa 424K",
        _ => "unknown",
    }
}

/// Extract the 2 byte card type code from an ATR: the two bytes preceding
/// the historical-bytes trailer, at offset `[len-7 .. len-5]`.
pub fn type_id_from_atr(atr: &[u8]) -> Option<[u8; 2]> {
    if atr.len() < 7 {
        return None;
    }
    let index = atr.len() - 7;
    Some([atr[index], atr[index + 1]])
}

/// The last block of each sector holds the authentication keys and access
/// conditions. Sectors are 4 blocks long up to block 128, 16 blocks after.
pub fn is_sector_trailer(block: u8) -> bool {
    if block < 128 {
        block % 4 == 3
    } else {
        block % 16 == 15
    }
}
