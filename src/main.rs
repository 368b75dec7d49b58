//! Command-line front end for the harmonix player core.
//!
//! `search` resolves a query against the catalogs, `render` plays a track
//! through the full signal graph into a WAV file, and `play` (with the
//! `streaming` feature) sends it to the system audio device.

#[cfg(not(feature = "decode"))]
fn main() {
    eprintln!(
        "The harmonix CLI requires the \"decode\" feature. Rebuild with `--features decode` to enable it."
    );
}

#[cfg(feature = "decode")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}

#[cfg(feature = "decode")]
mod cli {
    use anyhow::{bail, Context, Result};
    use clap::{Args, Parser, Subcommand};
    use harmonix::{
        AppConfig, Assistant, EqPreset, HttpMediaLoader, LoadOutcome, PlaybackEngine,
        SpatialMode, TrackDescriptor, TrackResolver,
    };
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::{info, warn};
    use tracing_subscriber::EnvFilter;

    const MEDIA_TIMEOUT: Duration = Duration::from_secs(60);

    #[derive(Parser)]
    #[command(name = "harmonix")]
    #[command(about = "Resolve, render and play music through the harmonix signal graph")]
    struct Cli {
        /// JSON configuration file
        #[arg(long, global = true)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand)]
    enum Command {
        /// Search the catalogs and list matching tracks
        Search {
            /// Free-text query
            query: String,
            /// Maximum number of results (0 = configured default)
            #[arg(short, long, default_value_t = 0)]
            limit: usize,
            /// Print descriptors as JSON
            #[arg(long)]
            json: bool,
        },
        /// Render a track through the signal graph into a WAV file
        #[cfg(feature = "export")]
        Render {
            #[command(flatten)]
            track: TrackArgs,
            /// Output WAV file
            #[arg(short, long)]
            out: PathBuf,
            /// Seconds of audio to render
            #[arg(long, default_value_t = 30.0)]
            seconds: f64,
        },
        /// Play a track on the system audio device
        #[cfg(feature = "streaming")]
        Play {
            #[command(flatten)]
            track: TrackArgs,
        },
        /// Fetch lyrics from the text assistant
        Lyrics {
            /// Song title
            song: String,
            /// Artist name
            artist: String,
        },
    }

    #[derive(Args)]
    struct TrackArgs {
        /// Query, URL or local file
        target: String,
        /// Spatial mode: off, 8d, 16d, 32d
        #[arg(long, default_value = "off")]
        spatial: SpatialMode,
        /// Equalizer preset: flat, bassBoost, trebleBoost, vocal
        #[arg(long)]
        preset: Option<String>,
        /// Volume 0..1
        #[arg(long)]
        volume: Option<f32>,
    }

    pub async fn run() -> Result<()> {
        let cli = Cli::parse();
        init_tracing();

        let config = match &cli.config {
            Some(path) => AppConfig::from_file(path)
                .with_context(|| format!("load config {}", path.display()))?,
            None => AppConfig::default(),
        }
        .with_env();

        match cli.command {
            Command::Search { query, limit, json } => search(&config, &query, limit, json).await,
            #[cfg(feature = "export")]
            Command::Render {
                track,
                out,
                seconds,
            } => render(&config, &track, &out, seconds).await,
            #[cfg(feature = "streaming")]
            Command::Play { track } => play(&config, &track).await,
            Command::Lyrics { song, artist } => {
                let assistant = Assistant::new(&config.assist, &config.resolver.demo_track_url);
                println!("{}", assistant.lyrics(&song, &artist).await);
                Ok(())
            }
        }
    }

    fn init_tracing() {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("harmonix=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    async fn search(config: &AppConfig, query: &str, limit: usize, json: bool) -> Result<()> {
        let resolver = TrackResolver::new(config.resolver.clone())?;
        let tracks = resolver.resolve(query, limit).await;
        if json {
            println!("{}", serde_json::to_string_pretty(&tracks)?);
            return Ok(());
        }
        for (i, t) in tracks.iter().enumerate() {
            println!(
                "{:>2}. {} - {} [{}] {}:{:02} {}",
                i + 1,
                t.title,
                t.artist,
                t.album,
                t.duration / 60,
                t.duration % 60,
                t.quality.as_deref().unwrap_or("")
            );
        }
        Ok(())
    }

    /// Engine with the requested graph settings, loaded and playing `target`.
    async fn start_engine(
        config: &AppConfig,
        engine_config: harmonix::EngineConfig,
        args: &TrackArgs,
    ) -> Result<PlaybackEngine> {
        let loader = HttpMediaLoader::new(MEDIA_TIMEOUT)?;
        let engine = PlaybackEngine::new(engine_config, Arc::new(loader));

        if let Some(name) = &args.preset {
            let Some(preset) = EqPreset::from_name(name) else {
                bail!("unknown preset {name:?}");
            };
            engine.apply_preset(preset);
        }
        if let Some(volume) = args.volume {
            engine.set_volume(volume);
        }

        if is_direct_source(&args.target) {
            engine.set_spatial_mode(args.spatial);
            if engine.load_track(&args.target).await? == LoadOutcome::Loaded {
                engine.play().await?;
            }
        } else {
            let track = resolve_first(config, &args.target).await?;
            info!(title = %track.title, artist = %track.artist, "now playing");
            engine.play_track(&track, args.spatial).await?;
        }
        Ok(engine)
    }

    fn is_direct_source(target: &str) -> bool {
        target.contains("://") || Path::new(target).exists()
    }

    async fn resolve_first(config: &AppConfig, query: &str) -> Result<TrackDescriptor> {
        let resolver = TrackResolver::new(config.resolver.clone())?;
        let mut tracks = resolver.resolve(query, 1).await;
        if tracks.is_empty() {
            bail!("nothing to play for an empty query");
        }
        let track = tracks.swap_remove(0);
        if track.is_placeholder() {
            warn!("catalogs unavailable; playing the demo track");
        }
        Ok(track)
    }

    #[cfg(feature = "export")]
    async fn render(config: &AppConfig, args: &TrackArgs, out: &Path, seconds: f64) -> Result<()> {
        let engine_config = harmonix::EngineConfig {
            render_quantum: 1024,
            ..config.engine.clone()
        };
        let engine = start_engine(config, engine_config, args).await?;
        let mut renderer = engine.renderer().with_motion();
        let summary = tokio::task::spawn_blocking({
            let out = out.to_path_buf();
            move || harmonix::render_to_wav(&mut renderer, out, seconds)
        })
        .await??;
        println!(
            "Wrote {:.1}s to {} (peak {:.3})",
            summary.duration_secs(),
            out.display(),
            summary.peak
        );
        Ok(())
    }

    #[cfg(feature = "streaming")]
    async fn play(config: &AppConfig, args: &TrackArgs) -> Result<()> {
        use harmonix::{AudioDevice, RenderLoop, StreamConfig};
        use std::io::Write;
        use tokio::sync::mpsc;

        let engine_config = config.engine.clone();
        let stream = StreamConfig::low_latency(engine_config.sample_rate);
        let engine = start_engine(config, engine_config.clone(), args).await?;

        let render_loop = RenderLoop::start(engine.renderer().with_motion(), stream, engine_config.render_quantum)?;
        let _device = AudioDevice::open(stream.sample_rate, render_loop.ring())?;

        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        engine.on_ended(move || {
            let _ = done_tx.send(());
        });

        #[cfg(feature = "visualization")]
        let mut sampler = engine.analyser().map(harmonix::VisualizerSampler::new);

        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        loop {
            tokio::select! {
                _ = done_rx.recv() => break,
                _ = ticker.tick() => {
                    let position = engine.current_time();
                    let duration = engine.duration();
                    #[allow(unused_mut)]
                    let mut line = format!("\r{:>6.1}s / {:>6.1}s ", position, duration);
                    #[cfg(feature = "visualization")]
                    if let Some(bins) = sampler.as_mut().and_then(|s| s.sample()) {
                        line.push_str(&harmonix::visualizer::spectrum_line(bins, 48));
                    }
                    print!("{line}");
                    std::io::stdout().flush().ok();
                }
            }
        }
        println!();
        drop(render_loop);
        Ok(())
    }
}
