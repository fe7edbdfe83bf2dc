use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use d7a_phy::dispatch::{SensorReport, TallySnapshot};
use d7a_phy::phy::channel::SyncwordClass;
use d7a_phy::phy::hal::SystemClock;
use d7a_phy::phy::packet::CrcStatus;
use d7a_phy::phy::sim::SimulatedHal;
use d7a_phy::sched::Timer;
use d7a_phy::util::hex::{decode_hex, encode_hex, pretty_hex};
use d7a_phy::util::logging::LogThrottle;
use d7a_phy::{
    init_logger, log_info, log_warn_throttled, ChannelId, Dispatcher, DllHeader, HwEvent,
    PacketPool, PhyConfig, Radio, RadioCallbacks, ResultMetadata, RxConfig, Scheduler,
    SequenceTally, TokioScheduler,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "d7a-phy")]
#[command(about = "Tools for the D7A PHY driver")]
struct Cli {
    /// JSON driver configuration; built-in gateway profiles if omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the access profile table
    Profiles,
    /// Decode a DLL header followed by its payload
    DecodeHeader { hex: String },
    /// Decode a two-byte channel id
    Channel { hex: String },
    /// Run a gateway against a simulated transceiver
    Gateway {
        #[arg(short, long, default_value_t = 20)]
        frames: u16,
        #[arg(long, default_value_t = 50)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PhyConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PhyConfig::default(),
    };

    match cli.command {
        Commands::Profiles => print_profiles(&config),
        Commands::DecodeHeader { hex } => {
            let bytes = decode_hex(&hex)?;
            let (header, payload) = DllHeader::decode(&bytes)?;
            println!("subnet:       0x{:02X}", header.subnet);
            println!("vid used:     {}", header.vid_used);
            println!("eirp index:   {} dBm", header.eirp_index);
            match header.target() {
                Some(address) => println!("target:       {}", encode_hex(address)),
                None => println!("target:       broadcast"),
            }
            if !payload.is_empty() {
                println!("payload ({} bytes):\n{}", payload.len(), pretty_hex(payload, 16));
            }
        }
        Commands::Channel { hex } => {
            let channel = ChannelId::from_bytes(&decode_hex(&hex)?)?;
            println!("band:         {:?}", channel.freq_band());
            println!("class:        {:?}", channel.class());
            println!("coding:       {:?}", channel.coding());
            println!("index:        {}", channel.center_freq_index);
            println!("center:       {} Hz", channel.center_frequency_hz());
        }
        Commands::Gateway {
            frames,
            interval_ms,
        } => run_gateway(&config, frames, Duration::from_millis(interval_ms)).await?,
    }

    Ok(())
}

fn print_profiles(config: &PhyConfig) {
    for (index, profile) in config.access_profiles.iter().enumerate() {
        let active = if index == config.access_class.profile_index() {
            " (active)"
        } else {
            ""
        };
        let header = profile.channel_header;
        println!(
            "profile {index}{active}: header 0x{:02X} {:?} {:?} {:?}",
            header.to_byte(),
            header.freq_band,
            header.class,
            header.coding
        );
        for (i, sp) in profile.subprofiles.iter().enumerate() {
            println!(
                "  sub-profile {i}: bitmap 0x{:02X}, scan period {}",
                sp.subband_bitmap, sp.scan_automation_period
            );
        }
        for (i, sb) in profile.subbands.iter().enumerate() {
            println!(
                "  sub-band {i}: channels {}..={}, EIRP {} dBm, CCA {} dBm, duty {}",
                sb.channel_index_start,
                sb.channel_index_end,
                sb.eirp_limit,
                sb.cca_threshold,
                sb.duty_limit
            );
        }
    }
}

/// Light the activity indicator for 200 ms.
fn blink(timer: &dyn Timer, indicator: &Arc<AtomicBool>) {
    indicator.store(true, Ordering::Relaxed);
    log::debug!("Activity indicator on");
    let indicator = indicator.clone();
    timer.post_delayed(
        Box::new(move || {
            indicator.store(false, Ordering::Relaxed);
            log::debug!("Activity indicator off");
        }),
        Duration::from_millis(200),
    );
}

fn log_report(meta: &ResultMetadata, report: &SensorReport, tally: TallySnapshot) {
    log_info(&format!(
        "Int T: {}.{} C",
        report.internal_temp_decicelsius / 10,
        report.internal_temp_decicelsius % 10
    ));
    log_info(&format!(
        "Ext T: {}.{:02} C, Ext H: {}.{:02} %",
        report.temperature_centi / 100,
        report.temperature_centi % 100,
        report.humidity_centi / 100,
        report.humidity_centi % 100
    ));
    log_info(&format!("Batt {} mV", report.vdd_mv));
    log_info(&format!("Recv {} / {}", tally.received, tally.expected));
    log_info(&format!("RX -{} dBm, LB {} dB", meta.rx_level, meta.link_budget));
}

/// Sensor frame for sequence number `counter`.
fn simulated_frame(header: &DllHeader, counter: u16) -> Result<Vec<u8>> {
    let report = SensorReport {
        internal_temp_decicelsius: 215 + counter % 5,
        temperature_centi: 2_140 + counter % 30,
        humidity_centi: 4_550,
        vdd_mv: 2_980,
        counter,
    };
    let mut frame = header.encode()?;
    frame.extend_from_slice(&report.encode());
    Ok(frame)
}

async fn run_gateway(config: &PhyConfig, frames: u16, interval: Duration) -> Result<()> {
    let hal = SimulatedHal::new();
    hal.handle().set_noise_floor(-104);
    let radio = Arc::new(Radio::new(hal, SystemClock::new(), config.radio_settings()));
    let pool = PacketPool::new(4, radio.max_packet_len());
    let (frames_tx, mut frames_rx) = tokio::sync::mpsc::unbounded_channel();

    radio
        .init(
            RadioCallbacks::new()
                .with_pool(&pool)
                .on_rx(move |packet| {
                    if frames_tx.send(packet).is_err() {
                        log::warn!("Gateway stopped, dropping received frame");
                    }
                })
                .on_tx(|_| {})
                .on_rssi_valid(|rssi| log_info(&format!("Channel RSSI {rssi} dBm"))),
        )
        .context("initializing radio")?;

    let channel = config
        .profile_table()
        .active(config.access_class)
        .and_then(|profile| profile.first_channel(config.access_class.subprofile_mask()))
        .context("active access profile has no usable channel")?;
    radio.set_rx(RxConfig::new(channel, SyncwordClass::Class0))?;
    log_info(&format!(
        "Listening on {:?} index {} ({} Hz)",
        channel.freq_band(),
        channel.center_freq_index,
        channel.center_frequency_hz()
    ));

    let scheduler = TokioScheduler::new()?;
    let stats_radio = radio.clone();
    scheduler.register_recurring_task(
        "radio-stats",
        Duration::from_secs(1),
        Box::new(move || log::debug!("Radio stats: {:?}", stats_radio.stats())),
    )?;

    let activity = Arc::new(AtomicBool::new(false));
    let mut tally = SequenceTally::new();
    let mut bad_reports = LogThrottle::new(1000, 3);
    let mut dispatcher = Dispatcher::new(|meta: ResultMetadata, payload: &[u8]| {
        blink(&scheduler, &activity);
        match SensorReport::parse(payload) {
            Some(report) => log_report(&meta, &report, tally.record(report.counter)),
            None => log_warn_throttled!(
                bad_reports,
                "{}-byte payload is not a sensor report",
                payload.len()
            ),
        }
    });

    let header = DllHeader::broadcast(0x00, 10);
    for counter in 0..frames {
        tokio::time::sleep(interval).await;
        radio.service();

        // every fifth frame is lost on air, every seventh arrives corrupted
        if counter % 5 == 4 {
            log::debug!("Frame {counter} lost on air");
            continue;
        }
        let frame = simulated_frame(&header, counter)?;
        let crc = if counter % 7 == 6 {
            CrcStatus::Invalid
        } else {
            CrcStatus::Valid
        };
        radio.handle_event(HwEvent::SyncDetected {
            length: frame.len(),
        });
        radio.handle_event(HwEvent::RxDone {
            data: frame,
            lqi: 40,
            rssi: -70 - (counter % 10) as i16,
            crc,
        });

        while let Ok(packet) = frames_rx.try_recv() {
            if let Err(e) = dispatcher.dispatch(&packet) {
                log::debug!("Frame not delivered: {e}");
            }
            pool.release(packet);
        }
    }

    let delivered = dispatcher.stats();
    drop(dispatcher);
    if let Err(e) = radio.set_idle() {
        log::debug!("Radio idle request: {e}");
    }
    // hand back a buffer aborted by the idle request
    radio.service();
    log_info(&format!(
        "Done: {} delivered, {} CRC errors, radio {:?}, pool {:?}",
        delivered.delivered,
        delivered.crc_errors,
        radio.stats(),
        pool.stats()
    ));
    Ok(())
}
