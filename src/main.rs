use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use postwhite::context::RuntimeContext;
use postwhite::server;

/// A per-recipient allow-list policy daemon for Postfix.
#[derive(Parser, Debug)]
#[command(name = "postwhited", author, version, about)]
struct Cli {
    /// Directory containing config.yml, messages.yml and recipients.yml.
    #[arg(short = 'c', long, default_value = "/etc/postwhite")]
    config_dir: PathBuf,

    /// Override the host to bind to (defaults to config.yml's `host`).
    #[arg(long)]
    host: Option<String>,

    /// Override the port to bind to (defaults to config.yml's `port`).
    #[arg(long)]
    port: Option<u16>,

    /// Increase log verbosity; repeatable.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbosity: u8,
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    let mut ctx = match RuntimeContext::load(&cli.config_dir) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("postwhited: failed to load configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if cli.host.is_some() || cli.port.is_some() {
        let mut config = ctx.config.clone();
        if let Some(host) = cli.host {
            config.host = host;
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        ctx = std::sync::Arc::new(postwhite::RuntimeContext {
            config,
            messages: ctx.messages.clone(),
            recipients: ctx.recipients.clone(),
        });
    }

    if let Err(err) = server::run(ctx).await {
        error!("postwhited exited: {}", err);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
