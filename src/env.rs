lazy_static::lazy_static! {
    pub static ref READER_FILTER: String = std::env::var("READER_FILTER").unwrap_or_else(|_| "ACR122U".to_owned());
    pub static ref MIN_POLL_PERIOD_MS: u64 = std::env::var("MIN_POLL_PERIOD_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(250);
    pub static ref COMMAND_TIMEOUT_MS: u64 = std::env::var("COMMAND_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(20_000);
}
