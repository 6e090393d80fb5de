use std::env;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Result;
use speaker_bulb::*;
use tokio::io::{self, AsyncBufReadExt, BufReader};

const USAGE: &str = "Usage: bulbd <id/mac address>";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Get a target id/mac address from command line arguments.
    let args: Vec<_> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    if args[1] == "-h" || args[1] == "--help" {
        eprintln!("{USAGE}");
        std::process::exit(0);
    }

    let transport = BleTransport::find(&args[1], Duration::from_secs(10)).await?;
    let bulb = SpeakerBulb::new(Arc::new(transport), SessionConfig::default());
    bulb.connect().await?;

    println!("OK");

    // Mainloop: one command per line until stdin closes
    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(input) = lines.next_line().await? {
        let mut cmd = input.trim().splitn(2, ':');
        let outcome = match (cmd.next(), cmd.next()) {
            (Some("power_on"), _) => bulb.turn_on(None, None).await,
            (Some("power_off"), _) => bulb.turn_off().await,
            (Some("set_color"), Some(arg)) => match parse_rgb(arg) {
                Some(rgb) => bulb.set_color_rgb(rgb).await,
                None => {
                    println!("ERR Invalid color format. Use R,G,B (e.g., 255,0,0 for red)");
                    continue;
                }
            },
            (Some("set_brightness"), Some(arg)) => match arg.trim().parse() {
                Ok(brightness) => bulb.set_brightness(brightness).await,
                Err(_) => {
                    println!("ERR Brightness must be between 0 and 255");
                    continue;
                }
            },
            (Some("set_volume"), Some(arg)) => match arg.trim().parse::<u8>() {
                Ok(level) if level <= 100 => bulb.set_volume(level).await,
                _ => {
                    println!("ERR Volume must be between 0 and 100");
                    continue;
                }
            },
            (Some("set_effect"), Some(arg)) => match arg.parse::<Effect>() {
                Ok(effect) => bulb.set_effect(effect).await,
                Err(e) => {
                    println!("ERR {e}");
                    continue;
                }
            },
            (Some("status"), _) => {
                match bulb.update().await {
                    Ok(true) => println!("{}", status_line(&bulb)),
                    Ok(false) => println!("ERR No status received"),
                    Err(e) => println!("ERR {e}"),
                }
                continue;
            }
            (Some(""), _) | (None, _) => {
                println!("ERR No command given");
                continue;
            }
            (Some(other), _) => {
                println!("ERR Unknown command: {other}");
                continue;
            }
        };

        match outcome {
            Ok(true) => println!("OK"),
            Ok(false) => println!("ERR Not acknowledged"),
            Err(e) => println!("ERR {e}"),
        }
    }

    bulb.disconnect().await?;
    Ok(())
}

fn parse_rgb(arg: &str) -> Option<Rgb> {
    let rgb = arg
        .split(',')
        .map(|s| s.trim().parse::<u8>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .ok()?;
    match rgb.as_slice() {
        &[red, green, blue] => Some(Rgb::new(red, green, blue)),
        _ => None,
    }
}

fn status_line(bulb: &SpeakerBulb) -> String {
    let light = bulb.light();
    let speaker = bulb.speaker();
    format!(
        "STATUS on={} brightness={} white={} effect={} volume={} preset={}",
        light.is_on().unwrap_or(false),
        light.brightness().unwrap_or(0),
        light.is_white(),
        light.effect().map_or("none", Effect::name),
        speaker.volume().unwrap_or(0),
        speaker.effect().map_or("custom", SpeakerEffect::name),
    )
}
