//! Desktop simulator for the command station.
//!
//! Runs the tick loop against a mock controller for a few simulated
//! seconds and logs the wire traffic it produces. The mock controller
//! answers CV reads and toggles an S88 contact, so ramps, pulse functions,
//! the wait-for-free-detector event and CV programming are all exercised.
//!
//! # Usage
//!
//! ```bash
//! cargo run --features cli --bin station-sim -- --seconds 5 --verbosity verbose
//! RUST_LOG=dcc_station::transport=trace cargo run --features cli --bin station-sim
//! ```

use anyhow::Context;
use clap::Parser;
use dcc_station::codec::encode_frame;
use dcc_station::config::{LogConfig, StationConfig};
use dcc_station::hal::{MockClock, MockSerial};
use dcc_station::logging::{self, Verbosity};
use dcc_station::protocol::telemetry;
use dcc_station::traits::Clock;
use dcc_station::{CommandStation, EventAction, FunctionMeta, SpeedSteps};

/// Simulated tick interval in milliseconds
const TICK_MS: u64 = 5;

/// S88 contact the demo train waits on
const BLOCK_CONTACT: u16 = 3;

#[derive(Debug, Parser)]
#[command(about = "Run the command station loop against a mock controller", long_about = None)]
struct Cli {
    /// Simulated run time in seconds
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    /// Log verbosity: silent, normal or verbose (also 0, 1, 2)
    #[arg(long, default_value = "normal", value_parser = parse_verbosity)]
    verbosity: Verbosity,
}

fn parse_verbosity(value: &str) -> Result<Verbosity, String> {
    Verbosity::from_text(value).ok_or_else(|| format!("unknown verbosity {value:?}"))
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = StationConfig::default()
        .with_name("station-sim")
        .with_log(LogConfig::default().with_verbosity(args.verbosity));
    logging::init(&config.log).context("installing log subscriber")?;

    let clock = MockClock::new();
    let port = MockSerial::with_clock(clock.clone());
    let mut station = CommandStation::with_config(port, clock.clone(), config);

    station.booster_on()?;
    let express = station.add_locomotive(3, SpeedSteps::Steps128)?;
    let shunter = station.add_locomotive(17, SpeedSteps::Steps28)?;
    let coach = station.add_addon(40, Some(express))?;

    station.set_function(express, 0, true)?;
    station.set_function_meta(
        express,
        2,
        FunctionMeta {
            pulse: true,
            sound: true,
            name: None,
        },
    )?;
    station.set_addon_function(coach, 1, true)?;
    station.set_speed_ramped(express, 60, 30)?;

    // Horn in one second; the shunter leaves once block 3 clears.
    station.add_event(
        10,
        EventAction::LocoFunction {
            loco: express,
            function: 2,
            on: true,
        },
    )?;
    station.add_event(
        5,
        EventAction::WaitForFreeDetector {
            contact: BLOCK_CONTACT,
            loco: shunter,
            speed: 10,
            ramp_tenths: 20,
        },
    )?;
    let occupied = encode_frame(&[telemetry::S88_STATUS, 1 << BLOCK_CONTACT])?;
    let free = encode_frame(&[telemetry::S88_STATUS, 0])?;
    let port = station.transport_mut().port_mut();
    port.queue_inbound(&occupied);
    port.queue_inbound_at(2000, &free);

    let end_ms = args.seconds * 1000;
    let mut sent = 0;
    while clock.now_ms() < end_ms {
        sent += station.tick()?;
        for action in station.drain_external_actions() {
            tracing::info!(?action, "external action");
        }
        clock.advance(TICK_MS);
    }

    // Mock controller answers the read 25 ms after it is sent.
    let reply = encode_frame(&[telemetry::PGM_CV_RESULT, 0, 1, 1, 3])?;
    station
        .transport_mut()
        .port_mut()
        .queue_inbound_at(clock.now_ms() + 25, &reply);
    let address = station.pgm_read_cv(1)?;

    let frames = station.transport().port().written_frames();
    for frame in frames.iter().take(12) {
        tracing::debug!(payload = ?frame.as_slice(), "wire");
    }
    tracing::info!(
        scheduled = sent,
        frames = frames.len(),
        express_speed = ?station.get_speed(express),
        shunter_speed = ?station.get_speed(shunter),
        decoder_address = address,
        stats = ?station.transport().stats(),
        "simulation finished"
    );
    Ok(())
}
