use clap::Parser;
use opsgate_gateway::{config, http};

#[derive(Parser)]
#[command(name = "opsgate-gateway", version, about = "Authenticated gateway for ArgoCD and Tekton targets")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, env = "OPSGATE_CONFIG_PATH", default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match config::GatewayConfig::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("STARTUP_ERROR {}", err);
            std::process::exit(1);
        }
    };

    let bind_addr = config.bind_addr;
    let targets = config.argocd.len() + config.tekton.len();

    let app = match http::router(config) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("STARTUP_ERROR {}", err);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(_) => {
            eprintln!("STARTUP_ERROR ERR_BIND_FAILED failed to bind gateway listener");
            std::process::exit(1);
        }
    };

    tracing::info!(bind_addr = %bind_addr, targets, "opsgate-gateway listening");

    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("STARTUP_ERROR ERR_SERVER_FAILED {}", err);
        std::process::exit(1);
    }
}
