//! uvc-capture binary: grab raw frames from a V4L2 camera.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use uvc_capture::{DeviceHandle, PixelFormat};

/// Capture raw frames from a V4L2 camera
#[derive(Parser)]
#[command(name = "uvc-capture")]
#[command(version)]
#[command(about = "Capture raw frames from a V4L2 camera")]
struct Cli {
    /// Video device node
    #[arg(short, long, default_value = "/dev/video0")]
    device: PathBuf,

    /// Requested frame width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Requested frame height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Pixel format id (0=RGB565 1=RGB32 2=BGR32 3=YUYV 4=UYVY 5=YUV420 6=YUV410 7=YUV422P)
    #[arg(short, long, default_value_t = 3)]
    format: i32,

    /// Number of frames to capture
    #[arg(short = 'n', long, default_value_t = 1)]
    frames: u32,

    /// Append raw frames to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// List discrete frame sizes for the format and exit
    #[arg(long)]
    list_sizes: bool,

    /// Enable verbose logging (use RUST_LOG=trace for more)
    #[arg(short, long)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let env = env_logger::Env::default();
    let env = if quiet {
        env.default_filter_or("error")
    } else if verbose {
        env.default_filter_or("debug")
    } else {
        env.default_filter_or("warn")
    };

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut device = DeviceHandle::open(&cli.device)?;

    println!("Device: {}", device.capabilities().card);
    println!("Driver: {}", device.capabilities().driver);

    if cli.list_sizes {
        let format = PixelFormat::from_id(cli.format).unwrap_or(PixelFormat::DEFAULT);
        for size in device.supported_preview_sizes(format)? {
            println!("{format} {}x{}", size.width, size.height);
        }
        return Ok(());
    }

    device.init(cli.width, cli.height, cli.format)?;

    let format = device.format();
    println!(
        "Format: {}x{} {} stride={} size={}",
        format.width,
        format.height,
        device
            .pixel_format()
            .map_or_else(|| "unknown".to_owned(), |f| f.to_string()),
        format.stride,
        format.size
    );

    let frame_size = device.frame_size().unwrap_or(format.size) as usize;
    let mut frame = vec![0u8; frame_size];
    let mut output = cli.output.as_ref().map(File::create).transpose()?;

    if cli.frames > 1 {
        device.start()?;
    }
    for index in 0..cli.frames {
        let copied = device.capture(&mut frame)?;
        println!("Frame {index}: {copied} bytes");

        if let (Some(file), Some(data)) = (output.as_mut(), frame.get(..copied)) {
            file.write_all(data)?;
        }
    }
    if device.is_streaming() {
        device.stop();
    }
    device.close();

    Ok(())
}
