//! Optical Scan CLI
//!
//! Command-line interface for demonstrating the scanning session and
//! frame pipeline. Events are printed to stdout as JSON lines.

use clap::{Parser, ValueEnum};
use optical_scan::{
    capture::{CameraProvider, FileConfig, MockCameraProvider, MockSurfaceRegistry},
    detection::{
        CodeFormat, CodeFormatSet, DecodedResult, Detector, DetectorError, QrDetector,
        ScriptedDetector,
    },
    permission::{MockPermissions, PermissionOutcome},
    session::{events, Initialized, Platform, ScanEvent, ScannerService, SessionState},
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// Live barcode/QR scanning demo.
#[derive(Debug, Parser)]
#[command(author, version, about = "Live barcode/QR scanning demo")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera identifier.
    #[arg(long)]
    camera: Option<String>,

    /// Quality preset: low, medium or high.
    #[arg(long)]
    quality: Option<String>,

    /// Comma-separated code formats, e.g. `qr,ean13`.
    #[arg(long, value_delimiter = ',')]
    formats: Vec<String>,

    /// Detector implementation.
    #[arg(long, value_enum, default_value_t = DetectorKind::Scripted)]
    detector: DetectorKind,

    /// Number of codes to deliver before exiting.
    #[arg(long)]
    codes: Option<u32>,

    /// Keep scanning until interrupted.
    #[arg(long)]
    continuous: bool,

    /// Frame rate of the simulated camera.
    #[arg(long)]
    fps: Option<u32>,

    /// Start without camera permission and grant it after the prompt.
    #[arg(long)]
    grant_after_prompt: bool,

    /// Serve Prometheus metrics on this port (0 disables).
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Use a real camera instead of the simulated one.
    #[cfg(feature = "camera")]
    #[arg(long)]
    native: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DetectorKind {
    /// Decodes a canned value every 15th frame.
    Scripted,
    /// Decodes QR codes with rqrr.
    Qr,
}

/// Frames between canned decodes of the scripted detector.
const SCRIPTED_CADENCE: u64 = 15;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Optical Scan v{}", optical_scan::VERSION);

    if let Err(err) = run(Args::parse()).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;
    let quality = args
        .quality
        .clone()
        .unwrap_or_else(|| config.scanner.quality.as_str().to_string());

    let (tx, mut events) = events::channel();
    let permissions = Arc::new(MockPermissions::new(!args.grant_after_prompt));
    let (cameras, simulated) = camera_provider(&args);

    let max_dimension = config.detector.max_dimension;
    let detector_kind = args.detector;
    let factory = move |formats: &CodeFormatSet| -> Result<Arc<dyn Detector>, DetectorError> {
        let detector: Arc<dyn Detector> = match detector_kind {
            DetectorKind::Scripted => {
                let format = formats.primary();
                let payload = vec![DecodedResult::new(demo_value(format), format)];
                Arc::new(ScriptedDetector::every(SCRIPTED_CADENCE, payload))
            }
            DetectorKind::Qr => Arc::new(QrDetector::new(formats, max_dimension)),
        };
        Ok(detector)
    };

    let platform = Platform::new(
        cameras,
        Arc::new(MockSurfaceRegistry::new()),
        permissions.clone(),
        Arc::new(factory),
        Arc::new(tx),
        tokio::runtime::Handle::current(),
    )
    .with_detection_timeout(config.detector.timeout());
    let mut service = ScannerService::new(platform);

    for camera in service.available_cameras()? {
        info!(name = %camera.name, lens_facing = ?camera.lens_facing, "Camera available");
    }

    let opened = match service.initialize(
        &config.scanner.camera_id,
        &quality,
        &config.scanner.code_formats,
    )? {
        Initialized::Opened(opened) => opened,
        Initialized::PermissionPending(ticket) => {
            info!("Camera permission requested, granting");
            permissions.set_granted(true);
            service.on_permission_result(PermissionOutcome::Granted)?;
            ticket.opened().await?
        }
    };
    println!("{}", serde_json::to_string(&opened)?);

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let producer = simulated.map(|cameras| {
        spawn_frame_producer(cameras, config.output.fps, Arc::clone(&stop_flag))
    });

    #[cfg(feature = "metrics")]
    start_metrics_server(
        args.metrics_port.unwrap_or(config.output.metrics_port),
        service.monitor(),
    );

    service.start_scanning()?;
    info!(
        continuous = config.output.continuous,
        codes = config.output.code_count,
        "Scanning started"
    );

    let mut delivered = 0u32;
    // Wakes the loop so Ctrl+C is noticed while no events arrive.
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    while !stop_flag.load(Ordering::SeqCst) {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                println!("{}", serde_json::to_string(&event)?);

                if matches!(event, ScanEvent::Code { .. }) {
                    delivered += 1;
                    if !config.output.continuous && delivered >= config.output.code_count {
                        break;
                    }
                    // Scanning is one-shot; re-arm for the next code.
                    service.start_scanning()?;
                } else if service.state() == Some(SessionState::Stopped) {
                    warn!("Camera lost, stopping");
                    break;
                }
            }
            _ = ticker.tick() => {}
        }
    }

    stop_flag.store(true, Ordering::SeqCst);
    if let Some(producer) = producer {
        if producer.join().is_err() {
            warn!("Frame producer panicked");
        }
    }

    service.dispose();
    while let Ok(event) = events.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }

    let counters = service.counters();
    info!(
        delivered,
        frames = counters.frames_received,
        submissions = counters.submissions,
        throttled = counters.frames_throttled,
        "Done"
    );
    Ok(())
}

fn load_config(args: &Args) -> Result<FileConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    if let Some(camera) = &args.camera {
        config.scanner.camera_id = camera.clone();
    }
    if !args.formats.is_empty() {
        config.scanner.code_formats = args.formats.clone();
    }
    if let Some(codes) = args.codes {
        config.output.code_count = codes;
    }
    if let Some(fps) = args.fps {
        config.output.fps = fps;
    }
    config.output.continuous |= args.continuous;

    config.validate()?;
    Ok(config)
}

/// Returns the provider, plus the simulated camera to pump if there is one.
fn camera_provider(args: &Args) -> (Arc<dyn CameraProvider>, Option<MockCameraProvider>) {
    #[cfg(feature = "camera")]
    if args.native {
        info!("Using native camera input");
        return (
            Arc::new(optical_scan::capture::NativeCameraProvider::new()),
            None,
        );
    }

    let _ = args;
    info!("Using simulated camera input");
    let cameras = MockCameraProvider::new();
    (Arc::new(cameras.clone()), Some(cameras))
}

/// Plays the role of the camera driver thread.
fn spawn_frame_producer(
    cameras: MockCameraProvider,
    fps: u32,
    stop_flag: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(1) / fps.max(1);
    std::thread::spawn(move || {
        while !stop_flag.load(Ordering::SeqCst) {
            cameras.push_frame();
            std::thread::sleep(interval);
        }
    })
}

#[cfg(feature = "metrics")]
fn start_metrics_server(port: u16, monitor: optical_scan::session::ScannerMonitor) {
    use optical_scan::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

    if port == 0 {
        return;
    }
    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!(error = %e, "Failed to create metrics registry, metrics disabled");
            return;
        }
    };
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry, monitor);
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            warn!(error = %e, "Metrics server stopped");
        }
    });
}

/// Canned payload for the scripted detector.
fn demo_value(format: CodeFormat) -> String {
    match format {
        CodeFormat::Qr => "https://example.com/scan".to_string(),
        CodeFormat::Ean13 => "4006381333931".to_string(),
        CodeFormat::Ean8 => "96385074".to_string(),
        CodeFormat::Upca => "036000291452".to_string(),
        other => format!("{}-0001", other.tag()),
    }
}
