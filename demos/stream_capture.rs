use std::env;
use std::sync::Arc;
use std::time::Instant;

use v4l_stream::io::{CancelToken, Stream};
use v4l_stream::{Device, Session, StreamConfig};

fn main() -> v4l_stream::Result<()> {
    env_logger::init();

    let path = env::args().nth(1).unwrap_or_else(|| "/dev/video0".to_string());
    println!("Using device: {}\n", path);

    // Capture 4 frames by default
    let count = 4;

    let config = StreamConfig::default().buffer_count(4);

    // Zero-copy: frames borrow the mapped buffers
    {
        let dev = Arc::new(Device::with_path(&path)?);
        let mut stream = Stream::with_buffers(dev, config.buffer_count)?;

        // warmup
        stream.next()?;

        let start = Instant::now();
        let mut megabytes_ps: f64 = 0.0;
        for i in 0..count {
            let t0 = Instant::now();
            let (buf, meta) = stream.next()?;
            let duration_us = t0.elapsed().as_micros().max(1);

            let cur = buf.len() as f64 / 1_048_576.0 * 1_000_000.0 / duration_us as f64;
            if i == 0 {
                megabytes_ps = cur;
            } else {
                let prev = megabytes_ps * (i as f64 / (i + 1) as f64);
                let now = cur * (1.0 / (i + 1) as f64);
                megabytes_ps = prev + now;
            }

            println!("Buffer");
            println!("  index     : {}", meta.index);
            println!("  sequence  : {}", meta.sequence);
            println!("  timestamp : {}", meta.timestamp);
            println!("  flags     : {}", meta.flags);
            println!("  length    : {}", buf.len());
        }

        println!();
        println!("FPS: {}", count as f64 / start.elapsed().as_secs_f64());
        println!("MB/s: {}", megabytes_ps);
        stream.release()?;
    }

    // Background capture: frames are copied out and handed over a bounded channel
    let mut session = Session::open(&path, config.clone())?;
    println!("\n{}", session.capabilities());
    let granted = session.start()?;
    println!("Granted {} buffers", granted);

    let cancel = CancelToken::new();
    let start = Instant::now();
    for frame in session.capture(cancel.clone())?.take(count) {
        let frame = frame?;
        println!(
            "Frame {} from buffer {}: {} bytes{}",
            frame.sequence,
            frame.index,
            frame.len(),
            if frame.is_corrupt() { " (corrupt)" } else { "" }
        );
    }
    println!("FPS: {}", count as f64 / start.elapsed().as_secs_f64());

    let stats = session.frame_pool().stats();
    println!(
        "Pool: {} gets, {} allocations, hit rate {:.2}",
        stats.gets,
        stats.allocs,
        stats.hit_rate()
    );

    session.close()
}
