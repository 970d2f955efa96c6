use clap::Parser;
use vidpump_core::PausePolicy;

#[derive(Debug, Parser, Clone)]
#[command(name = "vidpump-demo")]
#[command(about = "Scripted headless playback through the vidpump decode pump")]
pub struct Cli {
    /// Number of synthetic frames to play.
    #[arg(long, default_value_t = 90)]
    pub frames: u32,

    /// Frame rate of the synthetic stream.
    #[arg(long, default_value_t = 30.0)]
    pub fps: f32,

    /// Synthetic video size as WIDTHxHEIGHT.
    #[arg(long, default_value = "1280x720", value_parser = parse_size)]
    pub video: (u32, u32),

    /// Surface size as WIDTHxHEIGHT.
    #[arg(long, default_value = "1080x1920", value_parser = parse_size)]
    pub surface: (u32, u32),

    /// Drive the decoder through callbacks instead of polling it.
    #[arg(long)]
    pub callback: bool,

    /// Pause policy (hold or halt). Overrides VIDPUMP_PAUSE_POLICY.
    #[arg(long)]
    pub pause_policy: Option<PausePolicy>,

    /// Decoder poll timeout in milliseconds. Overrides VIDPUMP_POLL_TIMEOUT_MS.
    #[arg(long)]
    pub poll_timeout_ms: Option<u64>,

    /// Simulated decode latency per frame in milliseconds.
    #[arg(long, default_value_t = 4)]
    pub decode_latency_ms: u64,

    /// Play this long before tapping pause.
    #[arg(long, default_value_t = 1000)]
    pub pause_after_ms: u64,

    /// Stay paused this long before tapping again.
    #[arg(long, default_value_t = 500)]
    pub pause_for_ms: u64,
}

fn parse_size(raw: &str) -> Result<(u32, u32), String> {
    let (w, h) = raw
        .split_once(|c: char| c == 'x' || c == 'X')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{raw}'"))?;
    let w = w.trim().parse::<u32>().map_err(|e| format!("width: {e}"))?;
    let h = h.trim().parse::<u32>().map_err(|e| format!("height: {e}"))?;
    if w == 0 || h == 0 {
        return Err("size must be non-zero".to_string());
    }
    Ok((w, h))
}
