//! Debug capture harness
//!
//! Opens one camera, negotiates a mode, grabs a handful of frames and
//! reports their timing. Useful for verifying a camera end to end without
//! any application on top.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ps3eye::{Enumerator, OutputFormat};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "eye-capture")]
#[command(author, version, about = "Grab frames from a PlayStation Eye camera")]
struct Args {
    /// Index of the camera to open
    #[arg(short, long, default_value_t = 0)]
    index: usize,

    /// Frame width
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Frame height
    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Frame rate
    #[arg(long, default_value_t = 30)]
    fps: u16,

    /// Output format: bayer, rgb, bgr or gray
    #[arg(long, default_value = "rgb")]
    format: String,

    /// Number of frames to grab
    #[arg(short = 'n', long, default_value_t = 30)]
    frames: u32,

    /// List supported modes and detected cameras, then exit
    #[arg(long)]
    list: bool,
}

fn parse_format(name: &str) -> Result<OutputFormat> {
    Ok(match name {
        "bayer" => OutputFormat::Bayer,
        "rgb" => OutputFormat::Rgb,
        "bgr" => OutputFormat::Bgr,
        "gray" => OutputFormat::Gray,
        other => bail!("unknown format '{}'", other),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let format = parse_format(&args.format)?;

    let mut enumerator = Enumerator::new().context("libusb context")?;
    let ids = enumerator.enumerate(false).context("enumeration")?;

    if args.list {
        println!("supported modes:");
        for (w, h, fps) in ps3eye::supported_modes() {
            println!("  {}x{} @ {} fps", w, h, fps);
        }
        println!("detected cameras: {}", ids.len());
        for (i, id) in ids.iter().enumerate() {
            let cam = enumerator.camera(*id).expect("stale id");
            println!("  [{}] port {}", i, cam.usb_port_path());
        }
        return Ok(());
    }

    if ids.is_empty() {
        bail!("no PlayStation Eye camera found");
    }
    let Some(&id) = ids.get(args.index) else {
        bail!("camera index {} out of range ({} found)", args.index, ids.len());
    };
    let cam = enumerator.camera(id).expect("stale id");

    cam.open().context("open")?;
    cam.init(args.width, args.height, args.fps, format)
        .context("init")?;
    cam.start().context("start")?;
    info!("streaming from {}", cam.usb_port_path());

    let mut buf = vec![0u8; cam.frame_size()];
    let begin = Instant::now();
    for n in 0..args.frames {
        let timestamp = cam.get_frame(&mut buf).context("get_frame")?;
        info!("frame {} ({} bytes) at {:?}", n, buf.len(), timestamp);
    }
    let elapsed = begin.elapsed();
    println!(
        "{} frames in {:.2}s ({:.1} fps)",
        args.frames,
        elapsed.as_secs_f64(),
        args.frames as f64 / elapsed.as_secs_f64()
    );

    cam.stop();
    cam.close();
    Ok(())
}
