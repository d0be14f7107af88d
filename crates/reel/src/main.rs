use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;

use reel::media::video::FfmpegBackend;
use reel::{FrameStep, PixelBuffer, PlayerConfig, Tickable, VideoPlayer};

/// Headless player: decodes a clip in real time into an RGBA buffer.
#[derive(Parser, Debug)]
#[command(name = "reel", version, about)]
struct Args {
    /// Media file, resolved against the configured search paths
    file: String,

    /// Restart from the loop point instead of stopping at the end
    #[arg(long = "loop")]
    looping: bool,

    /// Seek to this position (seconds) before playing
    #[arg(long, conflicts_with = "frame")]
    seek: Option<f64>,

    /// Seek to this frame index before playing
    #[arg(long)]
    frame: Option<u64>,

    /// Stop after this much wall-clock time
    #[arg(long)]
    max_secs: Option<f64>,

    /// Write the last published frame to this PNG
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the selected stream and exit without playing
    #[arg(long)]
    probe: bool,

    /// Host tick rate (Hz)
    #[arg(long, default_value_t = 120.0)]
    tick_hz: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    if args.tick_hz <= 0.0 {
        bail!("--tick-hz must be positive");
    }

    let mut config = PlayerConfig::load();
    if args.looping {
        config.looping = true;
    }
    let backend = FfmpegBackend::new(config.decoder_threads);
    let mut player = VideoPlayer::new(backend, config);
    log::debug!("{:?}", player.config());

    player
        .open(&args.file)
        .with_context(|| format!("cannot open {}", args.file))?;

    if args.probe {
        if let Some(stream) = player.stream() {
            let d = &stream.descriptor;
            println!("stream      #{}", d.index);
            println!("codec       {}", d.codec);
            println!("size        {}x{}", d.width, d.height);
            println!(
                "pixel fmt   {}",
                d.pixel_format.as_deref().unwrap_or("unknown")
            );
            println!("time base   {}", d.time_base);
            println!("frame rate  {}", stream.frame_rate);
            println!("duration    {:.3}s", stream.duration_secs);
        }
        return Ok(());
    }

    if let Some(secs) = args.seek {
        player.seek_to_time(secs)?;
    } else if let Some(frame) = args.frame {
        player.seek_to_frame(frame)?;
    }

    player.play();
    let tick = Duration::from_secs_f64(1.0 / args.tick_hz);
    let start = Instant::now();
    let mut published = 0u64;

    while player.is_playing() {
        let elapsed = start.elapsed().as_secs_f64();
        if args.max_secs.is_some_and(|max| elapsed >= max) {
            break;
        }
        player.update(elapsed);
        if player.pixels_mut().is_some_and(PixelBuffer::take_dirty) {
            published += 1;
        }
        std::thread::sleep(tick);
    }

    if let Some(fault) = player.last_fault() {
        log::error!("Playback stopped: {fault}");
    }
    log::info!(
        "Published {published} frame(s) in {:.2}s, position {:.3}s / {:.3}s",
        start.elapsed().as_secs_f64(),
        player.position(),
        player.duration()
    );

    if let Some(path) = &args.snapshot {
        // A stopped player may still hold an unpublished seek landing frame.
        if published == 0 && player.load_next_frame() == FrameStep::Idle {
            bail!("nothing decoded to snapshot");
        }
        let pixels = player.pixels().context("no clip open")?;
        write_snapshot(pixels, path)?;
        log::info!("Wrote {}", path.display());
    }

    Ok(())
}

/// Save the buffer top-down as PNG.
fn write_snapshot(pixels: &PixelBuffer, path: &Path) -> Result<()> {
    let image = image::RgbaImage::from_raw(pixels.width(), pixels.height(), pixels.pixels().to_vec())
        .context("pixel buffer size mismatch")?;
    image::imageops::flip_vertical(&image)
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
