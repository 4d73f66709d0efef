//! Narrow transport boundary over PC/SC.
//!
//! The executor only needs "open a connection to a named reader" and
//! "transmit one frame"; keeping the boundary this small lets tests drive
//! the device with a scripted transport.

use std::ffi::CString;

use pcsc::{Context, Protocols, Scope, ShareMode};

use crate::{DriverError, DriverResult};

/// One transient card connection. Dropped (and thereby disconnected) at
/// the end of every command, on success and failure alike.
pub trait CardChannel {
    fn transmit(&self, query: &[u8]) -> DriverResult<Vec<u8>>;
}

pub trait Transport: Send + Sync {
    fn open(&self, reader_name: &str) -> DriverResult<Box<dyn CardChannel>>;
}

pub struct PcscTransport {
    ctx: Context,
}

impl PcscTransport {
    pub fn new() -> DriverResult<Self> {
        Ok(PcscTransport {
            ctx: Context::establish(Scope::User)?,
        })
    }
}

impl Transport for PcscTransport {
    fn open(&self, reader_name: &str) -> DriverResult<Box<dyn CardChannel>> {
        let name = CString::new(reader_name)
            .map_err(|_| DriverError::ContractViolation("reader name contains a NUL byte"))?;
        let card = self.ctx.connect(&name, ShareMode::Shared, Protocols::ANY)?;
        Ok(Box::new(PcscChannel { card }))
    }
}

struct PcscChannel {
    card: pcsc::Card,
}

impl CardChannel for PcscChannel {
    fn transmit(&self, query: &[u8]) -> DriverResult<Vec<u8>> {
        let mut data_buf = [0; pcsc::MAX_BUFFER_SIZE];
        let data = self.card.transmit(query, &mut data_buf)?;
        Ok(data.to_vec())
    }
}
