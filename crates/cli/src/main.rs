use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use camrtsp::{
    ConnectionScheduler, Frame, FrameSource, RtpStreamer, RtspListener, SchedulerConfig, Streamer,
    StreamerFactory,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Codec {
    Mjpeg,
    H264,
}

#[derive(Parser)]
#[command(
    name = "camrtsp-server",
    about = "RTSP camera simulator serving a synthetic test-pattern stream"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:8554")]
    bind: String,

    /// Codec family exposed on /mjpeg/1 or /h264/1
    #[arg(long, value_enum, default_value = "mjpeg")]
    codec: Codec,

    /// Synthetic frame rate of the test pattern producer
    #[arg(long, default_value_t = 20)]
    fps: u32,

    /// Frame width advertised in the SDP
    #[arg(long, default_value_t = 640)]
    width: u16,

    /// Frame height advertised in the SDP
    #[arg(long, default_value_t = 480)]
    height: u16,
}

/// Produce a synthetic frame. Not decodable video — just a recognizable
/// payload so NVR transport negotiation and RTP delivery can be exercised
/// without a camera attached.
fn test_pattern(codec: Codec, counter: u32, width: u16, height: u16) -> Frame {
    let data = match codec {
        Codec::Mjpeg => {
            // JPEG-shaped payload: SOI marker, patterned bytes, EOI marker.
            let mut data = vec![0xFF, 0xD8];
            data.extend((0..4096u32).map(|i| (i.wrapping_add(counter)) as u8));
            data.extend_from_slice(&[0xFF, 0xD9]);
            data
        }
        Codec::H264 => {
            // Single Annex B NAL with patterned payload.
            let mut data = vec![0, 0, 0, 1, 0x65];
            data.extend((0..4096u32).map(|i| (i.wrapping_mul(counter | 1)) as u8));
            data
        }
    };
    Frame::new(data, width, height)
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let listener = match RtspListener::bind(&args.bind) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", args.bind, e);
            return;
        }
    };

    let source = FrameSource::new();
    let running = Arc::new(AtomicBool::new(true));

    // Test-pattern producer stands in for the camera driver.
    let producer_source = source.clone();
    let producer_running = running.clone();
    let (codec, fps, width, height) = (args.codec, args.fps.max(1), args.width, args.height);
    let producer = thread::spawn(move || {
        let mut counter = 0u32;
        while producer_running.load(Ordering::SeqCst) {
            producer_source.publish(test_pattern(codec, counter, width, height));
            counter = counter.wrapping_add(1);
            thread::sleep(Duration::from_millis(1000 / fps as u64));
        }
    });

    let factory: StreamerFactory = match args.codec {
        Codec::Mjpeg => {
            let source = source.clone();
            Box::new(move || Ok(Box::new(RtpStreamer::mjpeg(source.clone())) as Box<dyn Streamer>))
        }
        Codec::H264 => {
            let source = source.clone();
            Box::new(move || Ok(Box::new(RtpStreamer::h264(source.clone())) as Box<dyn Streamer>))
        }
    };

    let config = SchedulerConfig {
        frame_interval_ms: 1000 / args.fps.max(1) as u64,
        video_size: (args.width, args.height),
        ..SchedulerConfig::default()
    };

    let scheduler_running = running.clone();
    let scheduler = thread::spawn(move || {
        let mut scheduler = ConnectionScheduler::new(listener, factory, config);
        scheduler.run(&scheduler_running, Duration::from_millis(2));
    });

    let path = match args.codec {
        Codec::Mjpeg => "mjpeg/1",
        Codec::H264 => "h264/1",
    };
    println!(
        "RTSP camera simulator on rtsp://{}/{} — press Enter to stop",
        args.bind, path
    );
    let mut input = String::new();
    let _ = io::stdin().read_line(&mut input);

    running.store(false, Ordering::SeqCst);
    let _ = producer.join();
    let _ = scheduler.join();
}
