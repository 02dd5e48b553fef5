//! Configuration for the render server.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the render server and its pipeline.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Directory holding previously uploaded images
    pub upload_dir: PathBuf,
    /// Directory holding public assets such as the music catalog
    pub public_dir: PathBuf,
    /// Directory receiving rendered videos
    pub output_dir: PathBuf,
    /// Scratch directory for staged assets, served under `/temp`
    pub scratch_dir: PathBuf,
    /// Origin the render server is reachable at, used for staged asset URLs
    /// and for fetching relative references
    pub public_base_url: String,
    /// Public path prefix of rendered videos
    pub output_url_prefix: String,
    /// Primary engine launcher (e.g. `npx`)
    pub engine_bin: String,
    /// Entry point of the render template
    pub engine_entry: PathBuf,
    /// Composition rendered by the primary engine
    pub composition_id: String,
    /// Frame rendering concurrency handed to the primary engine
    pub engine_concurrency: usize,
    pub engine_timeout: Duration,
    /// Fallback encoder binary
    pub encoder_bin: String,
    pub encoder_timeout: Duration,
    /// Bytes of encoder diagnostics retained for error reporting
    pub encoder_output_cap: usize,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Tail appended to the longest track
    pub timeline_margin_ms: u64,
    /// Global cap on concurrently running pipelines, `None` when unbounded
    pub max_concurrent_renders: Option<usize>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            addr: String::from("127.0.0.1"),
            port: String::from("3001"),
            upload_dir: PathBuf::from("./public/uploads"),
            public_dir: PathBuf::from("./public"),
            output_dir: PathBuf::from("./public/generated"),
            scratch_dir: PathBuf::from("./temp"),
            public_base_url: String::from("http://localhost:3001"),
            output_url_prefix: String::from("/generated"),
            engine_bin: String::from("npx"),
            engine_entry: PathBuf::from("./remotion-templates/src/index.tsx"),
            composition_id: String::from("DynamicVideo"),
            engine_concurrency: 4,
            engine_timeout: Duration::from_secs(300),
            encoder_bin: String::from("ffmpeg"),
            encoder_timeout: Duration::from_secs(300),
            encoder_output_cap: 64 * 1024,
            fps: 30,
            width: 1080,
            height: 1920,
            timeline_margin_ms: 500,
            max_concurrent_renders: Some(4),
        }
    }
}

impl RenderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let max_concurrent_renders = match parse_or("MAX_CONCURRENT_RENDERS", 4usize) {
            0 => None,
            n => Some(n),
        };

        Self {
            addr: env::var("ADDR").unwrap_or(defaults.addr),
            port: env::var("PORT").unwrap_or(defaults.port),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            public_dir: env::var("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.public_dir),
            output_dir: env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            scratch_dir: env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            public_base_url: env::var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            output_url_prefix: env::var("OUTPUT_URL_PREFIX")
                .unwrap_or(defaults.output_url_prefix),
            engine_bin: env::var("ENGINE_BIN").unwrap_or(defaults.engine_bin),
            engine_entry: env::var("ENGINE_ENTRY")
                .map(PathBuf::from)
                .unwrap_or(defaults.engine_entry),
            composition_id: env::var("ENGINE_COMPOSITION").unwrap_or(defaults.composition_id),
            engine_concurrency: parse_or("ENGINE_CONCURRENCY", defaults.engine_concurrency),
            engine_timeout: Duration::from_secs(parse_or("ENGINE_TIMEOUT_SECS", 300)),
            encoder_bin: env::var("ENCODER_BIN").unwrap_or(defaults.encoder_bin),
            encoder_timeout: Duration::from_secs(parse_or("ENCODER_TIMEOUT_SECS", 300)),
            encoder_output_cap: parse_or("ENCODER_OUTPUT_CAP", defaults.encoder_output_cap),
            fps: parse_or("VIDEO_FPS", defaults.fps),
            width: parse_or("VIDEO_WIDTH", defaults.width),
            height: parse_or("VIDEO_HEIGHT", defaults.height),
            timeline_margin_ms: parse_or("TIMELINE_MARGIN_MS", defaults.timeline_margin_ms),
            max_concurrent_renders,
        }
    }

    /// Public location of a rendered video.
    pub fn output_location(&self, file_name: &str) -> String {
        format!("{}/{}", self.output_url_prefix.trim_end_matches('/'), file_name)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
