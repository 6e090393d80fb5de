use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use speaker_bulb::*;
use tokio::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address or id of the bulb
    #[arg(short, long, required_unless_present = "fake")]
    address: Option<String>,

    /// Talk to a scripted in-memory bulb instead of a real adapter
    #[arg(long)]
    fake: bool,

    /// Device name the scripted bulb reports
    #[arg(long, requires = "fake")]
    fake_name: Option<String>,

    /// Status frame the scripted bulb answers with, as hex; repeat in reply order
    #[arg(long, requires = "fake")]
    fake_read: Vec<HexFrame>,

    /// Connection attempts before giving up
    #[arg(long, default_value_t = 3)]
    retries: u8,

    /// Timeout for a single transport operation, in seconds
    #[arg(long, default_value_t = 20)]
    timeout: u64,

    /// How long to scan for the bulb, in seconds
    #[arg(long, default_value_t = 10)]
    scan_timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Raw frame given on the command line as hexadecimal bytes
#[derive(Clone, Debug, PartialEq, Eq)]
struct HexFrame(Vec<u8>);

impl FromStr for HexFrame {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let digits: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.is_empty() || !digits.is_ascii() || digits.len() % 2 != 0 {
            return Err(format!("expected an even number of hex digits, got {value:?}"));
        }
        (0..digits.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&digits[i..i + 2], 16)
                    .map_err(|_| format!("invalid hex byte {:?}", &digits[i..i + 2]))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(HexFrame)
    }
}

#[derive(Clone, ValueEnum, Debug)]
enum Band {
    Hz80,
    Hz200,
    Hz500,
    Hz2k,
    Hz8k,
}

impl From<Band> for EqualizerBand {
    fn from(band: Band) -> Self {
        match band {
            Band::Hz80 => EqualizerBand::Hz80,
            Band::Hz200 => EqualizerBand::Hz200,
            Band::Hz500 => EqualizerBand::Hz500,
            Band::Hz2k => EqualizerBand::Hz2k,
            Band::Hz8k => EqualizerBand::Hz8k,
        }
    }
}

#[derive(Clone, ValueEnum, Debug)]
enum Slot {
    AutoLight,
    AutoMusic,
    Alarm1,
    Alarm2,
    Alarm3,
}

impl From<Slot> for TimerSlot {
    fn from(slot: Slot) -> Self {
        match slot {
            Slot::AutoLight => TimerSlot::AutoLight,
            Slot::AutoMusic => TimerSlot::AutoMusic,
            Slot::Alarm1 => TimerSlot::Alarm1,
            Slot::Alarm2 => TimerSlot::Alarm2,
            Slot::Alarm3 => TimerSlot::Alarm3,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum Switch {
    On,
    Off,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn the light on
    On {
        /// Brightness (0-255)
        #[arg(short, long)]
        brightness: Option<u8>,
    },
    /// Turn the light off
    Off,
    /// Set brightness
    Brightness {
        /// Brightness level (0-255)
        #[arg(short, long, default_value_t = 255)]
        level: u8,
    },
    /// Set custom RGB color
    Color {
        /// Red value (0-255)
        #[arg(short, long, default_value_t = 255)]
        red: u8,
        /// Green value (0-255)
        #[arg(short, long, default_value_t = 255)]
        green: u8,
        /// Blue value (0-255)
        #[arg(short, long, default_value_t = 255)]
        blue: u8,
    },
    /// Switch to white mode
    White,
    /// Set white intensity
    WhiteIntensity {
        /// Intensity (0-255)
        #[arg(short, long)]
        level: u8,
    },
    /// Set a light effect (see `effects`)
    Effect {
        /// Effect name, e.g. rainbow or candlelight
        name: Effect,
    },
    /// Set speaker volume
    Volume {
        /// Volume level (0-100)
        #[arg(short, long)]
        level: u8,
    },
    /// Select an equalizer preset
    SpeakerEffect {
        /// Preset name: flat, classical, pop, bass or jazz
        name: SpeakerEffect,
    },
    /// Set one equalizer band
    Band {
        #[arg(short, long, value_enum)]
        band: Band,
        /// Band level (0-100)
        #[arg(short, long)]
        level: u8,
    },
    /// Enable or disable a schedule or alarm
    Timer {
        #[arg(short, long, value_enum)]
        slot: Slot,
        #[arg(value_enum)]
        state: Switch,
    },
    /// List available effects
    Effects,
    /// Print light, speaker and timer state
    Status,
    /// Print statuses pushed by the bulb until interrupted
    Listen {
        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("speaker_bulb=info")),
        )
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let command = cli.command.unwrap_or(Commands::Status);
    if let Commands::Effects = command {
        print_effects();
        return Ok(());
    }

    let transport: Arc<dyn Transport> = if cli.fake {
        info!("Using the scripted bulb");
        Arc::new(scripted_bulb(cli.fake_name, cli.fake_read))
    } else {
        let address = cli
            .address
            .ok_or_else(|| eyre!("An address is required without --fake"))?;
        match BleTransport::find(&address, Duration::from_secs(cli.scan_timeout)).await {
            Ok(transport) => Arc::new(transport),
            Err(e) => {
                error!("Failed to find device: {}", e);
                return Err(e.into());
            }
        }
    };
    let config = SessionConfig::default()
        .with_retries(cli.retries)
        .with_timeout(Duration::from_secs(cli.timeout));
    let bulb = SpeakerBulb::new(transport, config);
    bulb.connect().await?;

    let acked = match command {
        Commands::On { brightness } => bulb.turn_on(brightness, None).await?,
        Commands::Off => bulb.turn_off().await?,
        Commands::Brightness { level } => bulb.set_brightness(level).await?,
        Commands::Color { red, green, blue } => {
            bulb.set_color_rgb(Rgb::new(red, green, blue)).await?
        }
        Commands::White => bulb.set_white().await?,
        Commands::WhiteIntensity { level } => bulb.set_white_intensity(level).await?,
        Commands::Effect { name } => bulb.set_effect(name).await?,
        Commands::Volume { level } => bulb.set_volume(level).await?,
        Commands::SpeakerEffect { name } => bulb.set_speaker_effect(name).await?,
        Commands::Band { band, level } => bulb.set_equalizer_band(band.into(), level).await?,
        Commands::Timer { slot, state } => {
            bulb.set_timer(slot.into(), matches!(state, Switch::On))
                .await?
        }
        Commands::Status => {
            let refreshed = bulb.update().await? & bulb.update_timers().await?;
            print_status(&bulb).await;
            refreshed
        }
        Commands::Listen { seconds } => {
            listen(&bulb, seconds).await?;
            true
        }
        Commands::Effects => true,
    };

    bulb.disconnect().await?;
    if !acked {
        return Err(eyre!("The bulb did not confirm the operation"));
    }
    Ok(())
}

fn scripted_bulb(name: Option<String>, reads: Vec<HexFrame>) -> FakeTransport {
    let fake = FakeTransport::new();
    fake.set_device_name(name.unwrap_or_else(|| "SPEAKER-BULB".to_string()));
    for HexFrame(frame) in reads {
        fake.push_read(frame);
    }
    fake
}

fn print_effects() {
    println!("Light effects:");
    for effect in Effect::all() {
        println!("  {}", effect);
    }
    println!("Speaker effects:");
    for effect in SpeakerEffect::ALL {
        println!("  {}", effect);
    }
}

async fn print_status(bulb: &SpeakerBulb) {
    if let Ok(Some(name)) = bulb.device_name().await {
        println!("Device: {}", name);
    }

    let light = bulb.light();
    println!("Light:");
    println!("  on:         {:?}", light.is_on());
    println!("  brightness: {:?}", light.brightness());
    println!("  color:      {:?}", light.rgb().map(|rgb| rgb.to_string()));
    println!("  white mode: {}", light.is_white());
    println!("  effect:     {:?}", light.effect().map(Effect::name));

    let speaker = bulb.speaker();
    println!("Speaker:");
    println!("  muted:      {:?}", speaker.is_muted());
    println!("  volume:     {:?}", speaker.volume());
    println!("  equalizer:  {:?}", speaker.equalizer());
    println!("  preset:     {:?}", speaker.effect().map(SpeakerEffect::name));

    let timers = bulb.timers();
    println!("Timers:");
    for slot in TimerSlot::ALL {
        println!("  {:<10}  {:?}", slot.to_string(), timers.is_enabled(slot));
    }
}

/// Prints pushed statuses until the time runs out or Ctrl-C
#[instrument(skip(bulb))]
async fn listen(bulb: &SpeakerBulb, seconds: Option<u64>) -> Result<()> {
    bulb.on_status(|status| println!("{:?}", status));
    info!("Listening for status notifications");

    match seconds {
        Some(seconds) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                signal = tokio::signal::ctrl_c() => signal?,
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn hex_frames_accept_spaced_and_packed_bytes() {
        assert_eq!(Ok(HexFrame(vec![0x55, 0xaa, 0x01])), "55aa01".parse());
        assert_eq!(Ok(HexFrame(vec![0x55, 0xaa, 0x01])), "55 AA 01".parse());
        assert!("55a".parse::<HexFrame>().is_err());
        assert!("zz".parse::<HexFrame>().is_err());
        assert!("".parse::<HexFrame>().is_err());
        assert!("é1".parse::<HexFrame>().is_err());
    }

    #[test]
    fn fake_mode_needs_no_address() {
        let cli = Cli::try_parse_from([
            "bulbc",
            "--fake",
            "--fake-read",
            "55aa01840410 57",
            "status",
        ])
        .unwrap();
        assert!(cli.fake);
        assert_eq!(None, cli.address);
        assert_eq!(
            vec![HexFrame(vec![0x55, 0xaa, 0x01, 0x84, 0x04, 0x10, 0x57])],
            cli.fake_read
        );

        assert!(Cli::try_parse_from(["bulbc", "status"]).is_err());
        assert!(Cli::try_parse_from(["bulbc", "--address", "x", "--fake-name", "n"]).is_err());
    }

    #[tokio::test]
    async fn scripted_bulb_answers_status_reads() -> speaker_bulb::Result<()> {
        let volume = HexFrame(vec![0x55, 0xaa, 0x01, 0x84, 0x04, 0x10, 0x57]);
        let fake = scripted_bulb(None, vec![volume]);
        let bulb = SpeakerBulb::new(Arc::new(fake), SessionConfig::default());

        assert_eq!(Some("SPEAKER-BULB".to_string()), bulb.device_name().await?);
        assert!(!bulb.update_speaker().await?);
        Ok(())
    }
}
