use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use glidepath::core::{coerce_number, default_catalog, fields, run_projection};

#[derive(Parser)]
#[command(name = "glidepath", version, about = "Retirement income and corpus projection engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the projection API over HTTP
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run a projection against the default catalog and print it as JSON
    Project {
        /// Projection horizon in years; overrides the catalog default
        #[arg(long)]
        years: Option<u32>,
        /// Override a base input, e.g. --set inflation_rate=8
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        overrides: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { port } => {
            if let Err(e) = glidepath::api::run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Project { years, overrides } => {
            if let Err(e) = run_local_projection(years, &overrides) {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
    }
}

fn run_local_projection(years: Option<u32>, overrides: &[String]) -> Result<(), String> {
    let catalog = default_catalog();
    let mut base = catalog.seed_context();
    for entry in overrides {
        let Some((name, value)) = entry.split_once('=') else {
            return Err(format!("invalid --set '{entry}', expected FIELD=VALUE"));
        };
        base.set_literal(name.trim(), coerce_number(value));
    }
    if let Some(years) = years {
        base.set_literal(fields::PROJECTION_YEARS, years as f64);
    }

    let projection = run_projection(&catalog, &base).map_err(|e| e.to_string())?;
    let rendered = serde_json::to_string_pretty(&projection).map_err(|e| e.to_string())?;
    println!("{rendered}");
    Ok(())
}
