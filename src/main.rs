//! Irisview - Camera Iris Tracking Overlay
//!
//! Main entry point for the CLI application.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use irisview::{
    capture::{CameraBackend, CameraFacing, SyntheticCamera},
    config::{Config, TrackerBackend},
    pipeline::Pipeline,
    scene::{CpuTextureCache, SceneActor},
    tracking::{subprocess::check_mediapipe_available, EventReceiver},
    web::WebServer,
    AppState,
};

/// Pooled CPU textures kept by the headless scene owner
const HEADLESS_TEXTURE_POOL: usize = 3;

/// Irisview - camera iris tracking overlay
#[derive(Parser, Debug)]
#[command(name = "irisview", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera to use: front or back (overrides config)
    #[arg(long)]
    camera: Option<CameraFacing>,

    /// Tracker backend: passthrough or mediapipe (overrides config)
    #[arg(short, long)]
    tracker: Option<TrackerBackend>,

    /// List available cameras and exit
    #[arg(long)]
    list_devices: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable HTTP server
    #[arg(long)]
    no_http: bool,

    /// HTTP server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Launch native UI window
    #[cfg(feature = "native-ui")]
    #[arg(long)]
    ui: bool,
}

/// Everything `main` keeps alive after setup
struct Services {
    state: Arc<AppState>,
    config: Config,
    pipeline: Pipeline,
    events: EventReceiver,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", irisview::NAME, irisview::VERSION);

    if args.list_devices {
        list_cameras(&SyntheticCamera::new());
        return Ok(());
    }

    // Build tokio runtime manually so the main thread stays free for the UI event loop
    let runtime = tokio::runtime::Runtime::new()?;

    let services = match runtime.block_on(setup_and_spawn_services(&args)) {
        Ok(services) => services,
        Err(e) => {
            error!("Setup failed: {:#}", e);
            return Err(e);
        }
    };
    let Services {
        state,
        config,
        mut pipeline,
        events,
    } = services;

    // If UI requested, run eframe on the main thread (blocks until window closes)
    #[cfg(feature = "native-ui")]
    if args.ui {
        info!("Launching native UI window");

        // Tracker tasks and the HTTP server keep running on the runtime
        let _guard = runtime.enter();

        let window_size = [config.display.width as f32, config.display.height as f32];
        if let Err(e) = irisview::ui::IrisviewApp::run(
            Arc::clone(&state),
            events,
            config.scene.clone(),
            pipeline.background_transform(),
            window_size,
        ) {
            error!("UI error: {}", e);
        }

        info!("UI window closed, shutting down");
        state.shutdown();
        pipeline.stop();

        // Give async tasks a moment to finish
        runtime.shutdown_timeout(std::time::Duration::from_secs(3));
        return Ok(());
    }

    // Headless mode: the scene owner runs as a task
    let mut actor = SceneActor::new(
        &config.scene,
        pipeline.background_transform(),
        CpuTextureCache::new(HEADLESS_TEXTURE_POOL)?,
        events,
        Arc::clone(&state),
    );
    let shutdown_rx = state.subscribe_shutdown();
    runtime.spawn(async move {
        actor.run(shutdown_rx).await;
    });

    // Wait for Ctrl+C / SIGTERM
    runtime.block_on(async {
        shutdown_signal().await;
        info!("Shutdown signal received");
        state.shutdown();
    });

    // Joins the capture threads, so it runs outside the runtime
    pipeline.stop();

    runtime.block_on(async {
        // Give tasks a moment to clean up
        tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
    });

    let stats = state.stats.snapshot();
    info!(
        "Irisview stopped: {} frames captured, {} delivered, {} poses applied",
        stats.frames_captured, stats.frames_delivered, stats.poses_applied
    );
    Ok(())
}

/// Setup config, create AppState, start the capture pipeline and spawn services.
async fn setup_and_spawn_services(args: &Args) -> anyhow::Result<Services> {
    // Load configuration
    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // Apply CLI overrides
    if let Some(camera) = args.camera {
        config.capture.facing = camera;
    }
    if let Some(tracker) = args.tracker {
        config.tracker.backend = tracker;
    }
    if args.no_http {
        config.http.enabled = false;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }

    // Validate configuration
    config.validate()?;

    info!("Camera: {}", config.capture.facing);
    info!("Tracker: {}", config.tracker.backend);
    info!("HTTP server: {}", config.http.enabled);

    if config.tracker.backend == TrackerBackend::MediaPipe
        && config.tracker.mediapipe.auto_launch
        && !check_mediapipe_available()
    {
        warn!("MediaPipe does not appear to be installed; the iris helper will likely fail to start");
    }

    // Create shared application state
    let state = AppState::new(config.clone());

    // Start HTTP server if enabled
    if config.http.enabled {
        let server = WebServer::new(Arc::clone(&state), &config.http);
        tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    let mut camera = SyntheticCamera::new();
    let (pipeline, events) = Pipeline::start(&config, &mut camera, Arc::clone(&state.stats))?;
    info!(
        "Pipeline running: {} camera -> {} tracker",
        pipeline.device().name,
        pipeline.tracker_name()
    );

    Ok(Services {
        state,
        config,
        pipeline,
        events,
    })
}

fn list_cameras(backend: &dyn CameraBackend) {
    println!("Available cameras:\n");

    for device in backend.devices() {
        let focus = if device.supports_locked_focus {
            "locked focus"
        } else {
            "auto focus only"
        };
        println!("  {} [{}] ({}, {})", device.name, device.id, device.facing, focus);
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
