mod api;
mod handlers;
mod models;
mod services;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

use handlers::presentation::render_response;
use services::capture::{prepare_capture, prepare_capture_bytes, prepare_frame};
use services::normalizer::{format_file_size, CompressOptions};
use services::CaptureClient;

#[derive(Parser)]
#[command(name = "calorie-lens", version, about = "Meal photo -> nutrition estimate")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Compress a meal photo, send it to a running server and print the estimate
    Analyze {
        /// JPEG, PNG or WebP image, or `-` to read it from stdin
        file: PathBuf,
        /// Extra details about the meal
        #[arg(long)]
        context: Option<String>,
        /// Re-run on the same image with more context; repeatable
        #[arg(long)]
        refine: Vec<String>,
        #[arg(long, env = "CALORIE_LENS_SERVER", default_value = "http://localhost:8080")]
        server: String,
        #[arg(long, env = "ACCESS_CODE")]
        code: String,
        /// Treat the input as one raw RGBA camera frame of this size, e.g. 1280x720
        #[arg(long, value_parser = parse_frame_size)]
        frame: Option<(u32, u32)>,
        #[arg(long, default_value_t = 1200)]
        max_dimension: u32,
        #[arg(long, default_value_t = 0.8)]
        quality: f32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        None => serve(env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())).await,
        Some(Command::Serve { bind }) => serve(bind).await,
        Some(Command::Analyze {
            file,
            context,
            refine,
            server,
            code,
            frame,
            max_dimension,
            quality,
        }) => {
            let options = CompressOptions {
                max_width: max_dimension,
                max_height: max_dimension,
                quality,
            };
            analyze(file, frame, context, refine, &server, &code, &options).await
        }
    }
}

#[cfg(feature = "http-server")]
async fn serve(bind: String) -> Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use api::server::{create_router, AppState};
    use handlers::{AnalyzeHandler, SessionGate};
    use services::{ModelGateway, OpenRouterService};

    log::info!("🚀 Starting Calorie Lens API...");

    // Load configuration
    let openrouter_api_key = env::var("OPENROUTER_API_KEY")
        .context("OPENROUTER_API_KEY must be set in .env file")?;

    let openrouter_model = env::var("OPENROUTER_MODEL").unwrap_or_else(|_| "openai/gpt-4o".to_string());

    let openrouter_base_url = env::var("OPENROUTER_BASE_URL")
        .unwrap_or_else(|_| services::openrouter::DEFAULT_BASE_URL.to_string());

    let ai_timeout = match env::var("AI_TIMEOUT_MS") {
        Ok(ms) => Duration::from_millis(ms.parse().context("AI_TIMEOUT_MS must be a number")?),
        Err(_) => services::gateway::AI_TIMEOUT,
    };

    let access_code = env::var("ACCESS_CODE").unwrap_or_else(|_| {
        log::warn!("⚠️ ACCESS_CODE not set, using default 'imfat' (INSECURE!)");
        "imfat".to_string()
    });

    let session_secret = match env::var("SESSION_SECRET") {
        Ok(secret) if !secret.is_empty() => secret.into_bytes(),
        _ => {
            log::warn!("⚠️ SESSION_SECRET not set, sessions will not survive a restart");
            SessionGate::random_secret()
        }
    };

    let secure_cookies = env::var("COOKIE_SECURE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let allowed_origins = env::var("ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            axum::http::HeaderValue::from_str(origin)
                .with_context(|| format!("Invalid origin in ALLOWED_ORIGINS: {}", origin))
        })
        .collect::<Result<Vec<_>>>()?;

    let openrouter = Arc::new(OpenRouterService::with_base_url(
        openrouter_api_key,
        openrouter_model.clone(),
        openrouter_base_url,
    ));
    log::info!("✅ OpenRouter service initialized with model: {}", openrouter_model);

    let gateway = ModelGateway::with_timeout(openrouter, ai_timeout);
    let analyze_handler = Arc::new(AnalyzeHandler::new(gateway));
    log::info!("✅ Analyze handler initialized (timeout {} ms)", ai_timeout.as_millis());

    let state = Arc::new(AppState {
        analyze_handler,
        sessions: Arc::new(SessionGate::new(access_code, session_secret)),
        secure_cookies,
        allowed_origins,
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    log::info!("🌐 Server listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(())
}

#[cfg(not(feature = "http-server"))]
async fn serve(_bind: String) -> Result<()> {
    anyhow::bail!("this build has no HTTP server; rebuild with --features http-server")
}

fn parse_frame_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {}", value))?;
    let width: u32 = width.parse().map_err(|e| format!("bad width: {}", e))?;
    let height: u32 = height.parse().map_err(|e| format!("bad height: {}", e))?;
    if width == 0 || height == 0 {
        return Err("frame dimensions must be positive".to_string());
    }
    Ok((width, height))
}

async fn analyze(
    file: PathBuf,
    frame: Option<(u32, u32)>,
    context: Option<String>,
    refine: Vec<String>,
    server: &str,
    code: &str,
    options: &CompressOptions,
) -> Result<()> {
    let from_stdin = file.as_os_str() == "-";
    let captured = if from_stdin || frame.is_some() {
        let bytes = if from_stdin {
            let mut bytes = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut bytes)
                .await
                .context("Failed to read image from stdin")?;
            bytes
        } else {
            tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?
        };

        match frame {
            Some((width, height)) => prepare_frame(width, height, bytes, options),
            None => prepare_capture_bytes(&bytes, options),
        }
    } else {
        prepare_capture(&file, options)
    };

    let image = match captured {
        Ok(image) => image,
        Err(e) => {
            println!("❌ {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "📸 {}x{} JPEG, {} -> {}",
        image.width,
        image.height,
        format_file_size(image.original_size),
        format_file_size(image.compressed_size)
    );

    let client = CaptureClient::new(server);
    let responses = client
        .analyze_and_refine(code, &image, context.as_deref(), &refine, |extra, response| {
            if let Some(extra) = extra {
                println!("🔁 Refined with: {}", extra);
            }
            println!("\n{}", render_response(response));
        })
        .await?;

    let failures = responses.iter().filter(|r| !r.is_success()).count();
    if failures > 0 {
        anyhow::bail!("{} analysis request(s) failed", failures);
    }
    Ok(())
}
