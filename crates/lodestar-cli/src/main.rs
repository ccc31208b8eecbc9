//! # Lodestar CLI Entry Point
//!
//! Main binary for the Lodestar RPC system. Starts registries and demo
//! servers, and queries or calls services from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Start a registry
//! lodestar registry -p 2181
//!
//! # Start the demo Echo service and announce it
//! lodestar serve -p 9001 --registry 127.0.0.1:2181
//!
//! # List live instances
//! lodestar discover Echo --registry 127.0.0.1:2181
//!
//! # Call a method (outputs raw JSON)
//! lodestar call Echo echo '["hello"]' -t string
//! ```
//!
//! Every flag falls back to the matching `LODESTAR_*` environment variable,
//! then to the built-in default.

mod demo;

use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use lodestar_client::{ClientConfig, LoadBalanceStrategy, RpcClient};
use lodestar_common::{RegistryClient, ServiceInterface, TypeDescriptor};
use lodestar_registry::{Registry, RegistryConfig};
use lodestar_server::{RpcServer, ServerConfig};
use serde_json::Value;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// Lodestar - service registry and RPC
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Registry**: Run the membership registry
/// - **Serve**: Run the demo Echo service
/// - **Discover**: Print the live instances of a service
/// - **Call**: Make a single RPC call (unix-friendly JSON output)
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Registry(RegistryArgs),
    Serve(ServeArgs),
    Discover(DiscoverArgs),
    Call(CallArgs),
}

/// Arguments for starting a registry.
#[derive(FromArgs)]
#[argh(subcommand, name = "registry")]
/// start a Lodestar registry
struct RegistryArgs {
    /// interface to bind (default: 0.0.0.0)
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// port to listen on (default: 2181)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// expected heartbeat period of instances in milliseconds (default: 3000)
    ///
    /// Instances silent for more than twice this long are removed.
    #[argh(option, long = "heartbeat-interval-ms")]
    heartbeat_interval_ms: Option<u64>,
}

/// Arguments for running the demo service.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve the demo Echo service
struct ServeArgs {
    /// host to bind and advertise (default: localhost)
    #[argh(option, short = 'b')]
    host: Option<String>,

    /// port to listen on (default: 8080)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// registry address (default: localhost:2181)
    #[argh(option, short = 'r')]
    registry: Option<String>,

    /// heartbeat period in milliseconds (default: 3000)
    #[argh(option, long = "heartbeat-interval-ms")]
    heartbeat_interval_ms: Option<u64>,

    /// do not announce to a registry
    #[argh(switch, long = "standalone")]
    standalone: bool,
}

/// Arguments for listing instances.
#[derive(FromArgs)]
#[argh(subcommand, name = "discover")]
/// print the live instances of a service as JSON
struct DiscoverArgs {
    /// service name
    #[argh(positional)]
    service: String,

    /// registry address (default: localhost:2181)
    #[argh(option, short = 'r')]
    registry: Option<String>,
}

/// Arguments for a single call.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a method and print its result as JSON
struct CallArgs {
    /// service name
    #[argh(positional)]
    service: String,

    /// method name
    #[argh(positional)]
    method: String,

    /// arguments as a JSON array
    #[argh(positional, default = "\"[]\".into()")]
    args: String,

    /// comma-separated parameter types, e.g. "int,string,list<int>"
    ///
    /// Must match the server's signature for the method. Defaults to "any"
    /// for every argument.
    #[argh(option, short = 't', long = "types")]
    types: Option<String>,

    /// registry address (default: localhost:2181)
    #[argh(option, short = 'r')]
    registry: Option<String>,

    /// request timeout in milliseconds (default: 5000)
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// load balancing strategy: roundRobin or random
    #[argh(option, long = "strategy")]
    strategy: Option<LoadBalanceStrategy>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // keep `call` and `discover` output clean for piping
    if !matches!(cli.command, Commands::Call(_) | Commands::Discover(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Registry(args) => run_registry(args).await,
        Commands::Serve(args) => run_serve(args).await,
        Commands::Discover(args) => run_discover(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

async fn run_registry(args: RegistryArgs) -> Result<()> {
    let mut config = RegistryConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.host = bind;
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(ms) = args.heartbeat_interval_ms {
        config = config.with_heartbeat_interval(Duration::from_millis(ms));
    }

    tracing::info!("Starting Lodestar registry on {}:{}", config.host, config.port);
    let registry = Registry::new(config)?;
    registry.run().await?;
    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = ServerConfig::from_env()?;
    if let Some(host) = args.host {
        config = config.with_host(host);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(registry) = args.registry {
        config = config.with_registry_address(registry);
    }
    if let Some(ms) = args.heartbeat_interval_ms {
        config = config.with_heartbeat_interval(Duration::from_millis(ms));
    }

    let mut server = RpcServer::bind(config, demo::dispatcher()).await?;
    if args.standalone {
        tracing::info!("Running standalone, not announcing to a registry");
    } else {
        server = server.with_registration()?;
    }

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn run_discover(args: DiscoverArgs) -> Result<()> {
    let address = match args.registry {
        Some(address) => address,
        None => ClientConfig::from_env()?.registry_address,
    };

    let instances = RegistryClient::new(&address)?.discover(&args.service).await?;
    println!("{}", serde_json::to_string_pretty(&instances)?);
    Ok(())
}

async fn run_call(args: CallArgs) -> Result<()> {
    let arguments: Vec<Value> = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in args (expected an array): {}", e))?;

    let parameters = match &args.types {
        Some(types) => parse_types(types)?,
        None => vec![TypeDescriptor::Any; arguments.len()],
    };
    if parameters.len() != arguments.len() {
        anyhow::bail!(
            "{} type(s) given for {} argument(s)",
            parameters.len(),
            arguments.len()
        );
    }

    let mut config = ClientConfig::from_env()?;
    if let Some(registry) = args.registry {
        config = config.with_registry_address(registry);
    }
    if let Some(ms) = args.timeout_ms {
        config = config.with_request_timeout(Duration::from_millis(ms));
    }
    if let Some(strategy) = args.strategy {
        config = config.with_load_balance_strategy(strategy);
    }

    let interface = ServiceInterface::builder(args.service)
        .method(args.method.clone(), parameters, TypeDescriptor::Any)
        .build()?;
    let proxy = RpcClient::new(config)?.proxy(interface)?;
    let result: Value = proxy.invoke(&args.method, arguments).await?;

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

/// Parses a comma-separated type list such as `int,list<string>`.
fn parse_types(list: &str) -> Result<Vec<TypeDescriptor>> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    list.split(',').map(|t| parse_type(t.trim())).collect()
}

fn parse_type(name: &str) -> Result<TypeDescriptor> {
    if let Some(inner) = name.strip_prefix("list<").and_then(|rest| rest.strip_suffix('>')) {
        return Ok(TypeDescriptor::list(parse_type(inner.trim())?));
    }
    serde_json::from_value(Value::String(name.to_lowercase()))
        .map_err(|_| anyhow::anyhow!("Unknown type '{}'", name))
}
