//! MotionStage - text-to-motion and body-shape playground
//!
//! Main entry point for the CLI application.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use motionstage::{
    body::{create_and_save_glb, BodyShapeResponse},
    character::CharacterModel,
    config::Config,
    motion::{BvhClip, RetargetMap},
    storage::MeshStore,
    web::WebServer,
    AppState,
};

/// MotionStage - preview generated motion on a parametric body
#[derive(Parser, Debug)]
#[command(name = "motionstage", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable HTTP server
    #[arg(long)]
    no_http: bool,

    /// HTTP server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print a BVH file's skeleton and timing, then exit
    #[arg(long, value_name = "FILE")]
    inspect_bvh: Option<PathBuf>,

    /// Character GLB to match against --inspect-bvh
    #[arg(long, value_name = "GLB", requires = "inspect_bvh")]
    character: Option<PathBuf>,

    /// Build a GLB from a saved body-shape response and store it, then exit
    #[arg(long, value_name = "JSON")]
    build_mesh: Option<PathBuf>,

    /// Launch native UI window
    #[cfg(feature = "native-ui")]
    #[arg(long)]
    ui: bool,
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

    info!("Starting {} v{}", motionstage::NAME, motionstage::VERSION);

    let config = load_config(&args)?;

    // One-shot tools
    if let Some(ref path) = args.inspect_bvh {
        return inspect_bvh(path, args.character.as_deref(), &config.viewer.bone_prefix);
    }

    // Build tokio runtime manually so the main thread stays free for the UI event loop
    let runtime = tokio::runtime::Runtime::new()?;

    if let Some(ref path) = args.build_mesh {
        return runtime.block_on(build_mesh(path, &config));
    }

    // Do all async setup on the runtime
    let state = runtime.block_on(async { spawn_services(config).await })?;

    // If UI requested, run eframe on the main thread (blocks until window closes)
    #[cfg(feature = "native-ui")]
    if args.ui {
        info!("Launching native UI window");
        let ui_state = Arc::clone(&state);

        // Enter the tokio runtime context so the UI can spawn requests
        let _guard = runtime.enter();

        // eframe::run_native blocks the main thread (winit requirement)
        if let Err(e) = motionstage::ui::MotionStageApp::run(ui_state) {
            error!("UI error: {}", e);
        }

        info!("UI window closed, shutting down");
        state.shutdown();

        // Give async tasks a moment to finish
        runtime.shutdown_timeout(std::time::Duration::from_secs(3));
        return Ok(());
    }

    // Headless mode: wait for Ctrl+C / SIGTERM
    runtime.block_on(async {
        shutdown_signal().await;
        info!("Shutdown signal received");
        state.shutdown();

        // Give tasks a moment to clean up
        tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
    });

    info!("MotionStage stopped");
    Ok(())
}

/// Load configuration and apply CLI overrides
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    if args.no_http {
        config.http.enabled = false;
    }
    if let Some(port) = args.port {
        config.set_http_port(port);
    }

    config.validate()?;
    Ok(config)
}

/// Create AppState and spawn the background services.
async fn spawn_services(config: Config) -> anyhow::Result<Arc<AppState>> {
    info!("Motion service: {}", config.services.motion_url);
    info!("Body-shape service: {}", config.services.body_shape_url);
    info!("Mesh path: {}", config.storage.public_dir.join(&config.storage.mesh_file).display());
    info!("HTTP server: {}", config.http.enabled);

    let http_enabled = config.http.enabled;
    let state = AppState::new(config)?;

    if http_enabled {
        let http_state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = run_http_server(http_state).await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    Ok(state)
}

async fn run_http_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let config = state.config.read().await;
    let http_config = config.http.clone();
    drop(config);

    let web_server = WebServer::new(state.clone(), &http_config);

    let addr = format!("{}:{}", http_config.host, http_config.port);
    info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let mut shutdown_rx = state.subscribe_shutdown();

    axum::serve(listener, web_server.router())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

fn inspect_bvh(path: &Path, character: Option<&Path>, bone_prefix: &str) -> anyhow::Result<()> {
    let clip = BvhClip::load(path)?;

    println!("{}\n", path.display());
    println!(
        "  frames: {}  frame time: {:.4}s  duration: {:.2}s\n",
        clip.frame_count(),
        clip.frame_time(),
        clip.duration()
    );

    for joint in clip.joints() {
        let depth = std::iter::successors(joint.parent, |&p| clip.joints()[p].parent).count();
        println!(
            "  {}{} ({} channels)",
            "  ".repeat(depth),
            joint.name,
            joint.channels.len()
        );
    }

    if let Some(character) = character {
        let model = CharacterModel::load(character)?;
        let targets = model.skin_joints();
        let map = RetargetMap::build(targets.iter().copied(), clip.joints(), bone_prefix);

        println!(
            "\n{}: {} of {} bones matched\n",
            character.display(),
            map.len(),
            targets.len()
        );
        for pair in map.pairs() {
            println!("  {} <- {}", model.node_names[pair.target], pair.name);
        }
        for (index, name) in &targets {
            if !map.pairs().iter().any(|p| p.target == *index) {
                println!("  {} (unmatched)", name);
            }
        }
    }

    Ok(())
}

async fn build_mesh(path: &Path, config: &Config) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(path).await?;
    let response: BodyShapeResponse = serde_json::from_str(&text)?;

    let store = MeshStore::from_config(&config.storage);
    let url = create_and_save_glb(response, &store).await?;

    println!("{} -> {}", path.display(), store.path().display());
    info!("Mesh available at {}", url);
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_flag_moves_upload_and_asset_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[http]\nport = 3000\n").unwrap();

        let args = Args::try_parse_from([
            "motionstage",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "4000",
        ])
        .unwrap();
        let config = load_config(&args).unwrap();

        assert_eq!(config.http.port, 4000);
        assert_eq!(config.services.upload_url, "http://localhost:4000/api/upload");
        assert_eq!(config.services.asset_base_url, "http://localhost:4000");
    }
}
