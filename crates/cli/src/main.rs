use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use xfn_core::codec::{self, Format};
use xfn_core::{RunFunctionRequest, RunFunctionResponse};
use xfn_engine::{negotiate, EngineConfig};
use xfn_runtime::logging::{self, Level};
use xfn_runtime::ServeOptions;
use xfn_store::{snapshot_from_objects, WorldSnapshot};

#[derive(Parser, Debug)]
#[command(name = "xfnctl", version, about = "Serve or render xfn composition functions")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve a built-in function over HTTP
    Serve {
        /// Function to serve (deployment, parent-lookup)
        #[arg(long = "function", env = "XFN_FUNCTION")]
        function: String,
        /// Listen address
        #[arg(long = "address", env = "XFN_ADDRESS", default_value = "0.0.0.0:9443")]
        address: String,
        /// Serve plaintext; TLS must be terminated in front of the server
        #[arg(long = "insecure", action = ArgAction::SetTrue)]
        insecure: bool,
        /// Human-readable debug logs instead of JSON
        #[arg(long = "debug", short = 'd', action = ArgAction::SetTrue)]
        debug: bool,
    },
    /// Run a function locally against a request file, negotiating extra
    /// resources against an optional list of live objects
    Render {
        #[arg(long = "function")]
        function: String,
        /// Request file (.json, .yaml or .yml)
        #[arg(long = "request")]
        request: PathBuf,
        /// Live objects to resolve selectors against (a list, JSON or YAML)
        #[arg(long = "world")]
        world: Option<PathBuf>,
    },
}

fn init_tracing() {
    let env = std::env::var("XFN_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("XFN_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid XFN_METRICS_ADDR; expected host:port");
        }
    }
}

fn runner(name: &str) -> Result<xfn_api::SharedRunner> {
    xfn_functions::by_name(name)
        .ok_or_else(|| anyhow!("unknown function {name:?}; expected one of {}", xfn_functions::NAMES.join(", ")))
}

fn read_doc<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    codec::decode(&bytes, Format::from_path(path)).with_context(|| format!("decoding {}", path.display()))
}

/// Freeze `objects` into one snapshot, warning about any that cannot be
/// selected.
fn load_world(objects: Vec<serde_json::Value>) -> Arc<WorldSnapshot> {
    let want = objects.len();
    let snap = snapshot_from_objects(objects);
    if snap.len() < want {
        warn!(want, have = snap.len(), "some objects could not be loaded");
    }
    info!(objects = snap.len(), "world loaded");
    snap
}

fn print_human(rsp: &RunFunctionResponse, rounds: u32) {
    println!("tag:      {}", rsp.tag());
    println!("ttl:      {}", codec::format_duration(rsp.ttl()));
    println!("rounds:   {}", rounds);
    println!("severity: {}", rsp.severity());
    if !rsp.results.is_empty() {
        println!();
        println!("SEVERITY          MESSAGE");
        for r in &rsp.results {
            println!("{:<17} {}", r.severity.as_str(), r.message);
        }
    }
    if !rsp.desired.is_empty() {
        println!();
        println!("RESOURCE             KIND                 READY");
        for name in rsp.desired.names() {
            let Some(r) = rsp.desired.resource(name) else { continue };
            println!("{:<20} {:<20} {:?}", name, r.kind().unwrap_or("-"), r.ready);
        }
    }
    for c in &rsp.conditions {
        println!("condition {}={:?} ({})", c.typ, c.status, c.reason);
    }
    for (name, sel) in rsp.requirements.iter() {
        println!("pending {} -> {}/{}", name, sel.api_version, sel.kind);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { function, address, insecure, debug } => {
            logging::configure(Level::from_debug_flag(debug))?;
            init_metrics();
            let runner = runner(&function)?;
            xfn_runtime::serve(runner, ServeOptions { address, insecure }).await?;
        }
        Commands::Render { function, request, world } => {
            init_tracing();
            init_metrics();
            let runner = runner(&function)?;
            let req: RunFunctionRequest = read_doc(&request)?;
            let objects: Vec<serde_json::Value> = match &world {
                Some(path) => read_doc(path)?,
                None => Vec::new(),
            };
            let world = load_world(objects);
            let cfg = EngineConfig::from_env();
            let t0 = Instant::now();
            let n = negotiate(runner.as_ref(), req, &world, &cfg).await?;
            info!(rounds = n.rounds, stalled = n.stalled, took_ms = %t0.elapsed().as_millis(), "render done");
            if n.stalled {
                warn!("function repeated its requirements; showing the last response");
            }
            match cli.output {
                Output::Human => print_human(&n.response, n.rounds),
                Output::Json => println!("{}", serde_json::to_string_pretty(&n.response)?),
                Output::Yaml => print!("{}", serde_yaml::to_string(&n.response)?),
            }
        }
    }
    Ok(())
}
