use std::process::exit;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info};

use acr122u::device::{key_search, monitor, Acr122u, HotplugBridge, PcscTransport, SessionState};
use acr122u::{env, DriverError, DriverResult};

fn main() {
    dotenv::dotenv().ok();
    std::env::set_var("RUST_LOG", "acr122u=info");
    env_logger::init();

    if let Err(err) = run() {
        error!("{err}");
        exit(1);
    }
}

fn run() -> DriverResult<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let get_uid = args.iter().any(|arg| arg == "--getuid");
    let search_keys = args.iter().any(|arg| arg == "--search-keys");

    let session = Arc::new(Mutex::new(SessionState::new(Duration::from_millis(
        *env::MIN_POLL_PERIOD_MS,
    ))));
    monitor::run(HotplugBridge::new(
        session.clone(),
        env::READER_FILTER.clone(),
    ));

    let device = Acr122u::new(
        session,
        Arc::new(PcscTransport::new()?),
        Duration::from_millis(*env::COMMAND_TIMEOUT_MS),
    );

    info!(
        "waiting for a '{}' reader and a card ({}ms timeout)",
        *env::READER_FILTER,
        *env::COMMAND_TIMEOUT_MS
    );

    println!("firmware = {}", device.firmware_version()?);
    println!("uid      = {}", device.get_uid()?);
    println!("ats      = {}", device.get_ats()?);

    if get_uid {
        println!("get uid  = {}", device.get_uid()?);
        println!("get ats  = {}", device.get_ats()?);
    }

    if search_keys {
        let geometry = device.card_geometry().ok_or(DriverError::NoCardPresent)?;
        info!(
            "sweeping default keys over '{}' ({} blocks)",
            geometry.label, geometry.block_count
        );
        for found in key_search::search_default_keys(&device, &geometry)? {
            println!(
                "block {:3} {:?}: {}",
                found.block,
                found.key_type,
                acr122u::utils::bytes_to_string(&found.key)
            );
        }
    }

    Ok(())
}
