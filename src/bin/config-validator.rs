//! # Warden Configuration Validator
//!
//! Command-line tool for validating warden gateway configuration files.
//! Helps identify configuration issues before starting the gateway.

use clap::{Parser, Subcommand};
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use warden_core::config::{StoreBackendKind, WardenConfig};

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate warden gateway configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file path (default: environment variables only)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate all configuration components
    All,

    /// Validate specific configuration component
    Component {
        /// Component name (gateway, security, health, circuit-breaker, queue, store)
        name: String,
    },

    /// Print a complete example configuration in YAML
    Example,
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Example) => print_example_config(),
        None => validate_all_config(&cli), // Default action
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> Result<WardenConfig, Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => {
            println!("Config file: {}", path);
            WardenConfig::from_yaml_file(path)?
        }
        None => {
            println!("Config source: environment variables");
            WardenConfig::from_env()?
        }
    };
    Ok(config)
}

fn validate_all_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔧 Validating Warden Gateway Configuration");
    println!();

    let config = match load_config(cli) {
        Ok(config) => {
            println!("✅ Configuration loaded successfully");
            config
        }
        Err(e) => {
            println!("❌ Failed to load configuration: {}", e);
            println!("   This is the same error that gateway bootstrap would encounter");
            return Err(e);
        }
    };

    config.validate()?;

    validate_gateway_config(&config)?;
    validate_security_config(&config)?;
    validate_health_config(&config)?;
    validate_circuit_breaker_config(&config)?;
    validate_queue_config(&config)?;
    validate_store_config(&config)?;

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, component_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔧 Validating Component: {}", component_name);
    println!();

    let config = load_config(cli)?;
    config.validate()?;

    match component_name.to_lowercase().as_str() {
        "gateway" => validate_gateway_config(&config)?,
        "security" => validate_security_config(&config)?,
        "health" => validate_health_config(&config)?,
        "circuit_breaker" | "circuit-breaker" => validate_circuit_breaker_config(&config)?,
        "queue" | "jobs" => validate_queue_config(&config)?,
        "store" => validate_store_config(&config)?,
        _ => {
            return Err(format!("Unknown component: {}", component_name).into());
        }
    }

    println!("✅ Component '{}' validation passed!", component_name);
    Ok(())
}

fn print_example_config() -> Result<(), Box<dyn std::error::Error>> {
    let config = WardenConfig::default();
    println!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

// Component validation functions

fn validate_gateway_config(config: &WardenConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🛡️  Validating Gateway Configuration...");

    if config.gateway.development_mode {
        println!("   ⚠️  Development mode enabled: plain-http service URLs are allowed");
    }

    let mut seen = std::collections::HashSet::new();
    for service in &config.gateway.static_services {
        if service.name.trim().is_empty() {
            return Err("Static service with empty name".into());
        }
        if !seen.insert(service.name.as_str()) {
            return Err(format!("Duplicate static service name: {}", service.name).into());
        }
        if !config.gateway.development_mode && !service.base_url.starts_with("https://") {
            return Err(format!(
                "Static service '{}' uses a non-https URL outside development mode",
                service.name
            )
            .into());
        }
    }

    println!(
        "   ✅ {} static service(s), event capacity {}",
        config.gateway.static_services.len(),
        config.gateway.event_capacity
    );

    Ok(())
}

fn validate_security_config(config: &WardenConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔒 Validating Security Configuration...");

    println!(
        "   ✅ Payload ceiling: {} bytes",
        config.security.max_payload_bytes
    );
    println!(
        "   ✅ Rate limit: {} requests per {}s window",
        config.security.rate_limit_max_requests, config.security.rate_limit_window_secs
    );

    Ok(())
}

fn validate_health_config(config: &WardenConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("💓 Validating Health Monitor Configuration...");

    if config.health.probe_timeout_secs >= config.health.probe_interval_secs {
        println!("   ⚠️  Probe timeout is not shorter than the probe interval; probes may overlap");
    }

    println!(
        "   ✅ Probe every {}s with {}s timeout, degraded above {}ms",
        config.health.probe_interval_secs,
        config.health.probe_timeout_secs,
        config.health.degraded_latency_ms
    );

    Ok(())
}

fn validate_circuit_breaker_config(config: &WardenConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔌 Validating Circuit Breaker Configuration...");

    println!(
        "   ✅ Opens after {} consecutive failures, {}s cooldown",
        config.circuit_breaker.failure_threshold, config.circuit_breaker.cooldown_secs
    );

    Ok(())
}

fn validate_queue_config(config: &WardenConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("📬 Validating Queue Configuration...");

    if config.queue.lease_timeout_secs <= config.queue.poll_interval_ms / 1000 {
        return Err("queue.lease_timeout_secs must exceed the worker poll interval".into());
    }

    println!(
        "   ✅ {} worker(s) over queues: {}",
        config.queue.workers,
        config.queue.queues.join(", ")
    );
    println!(
        "   ✅ Retries: {} max, backoff capped at {}s, {}s lease with {}s reaper interval",
        config.queue.default_max_retries,
        config.queue.max_backoff_secs,
        config.queue.lease_timeout_secs,
        config.queue.reaper_interval_secs
    );

    Ok(())
}

fn validate_store_config(config: &WardenConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🗄️  Validating Store Configuration...");

    match config.store.backend {
        StoreBackendKind::Memory => {
            println!("   ✅ Memory backend (jobs do not survive restarts)");
        }
        StoreBackendKind::Redis => {
            if config.store.redis_url.trim().is_empty() {
                return Err("store.redis_url is required for the redis backend".into());
            }
            if !config.store.redis_url.starts_with("redis://")
                && !config.store.redis_url.starts_with("rediss://")
            {
                return Err("store.redis_url must start with redis:// or rediss://".into());
            }
            println!("   ✅ Redis backend with key prefix '{}'", config.store.key_prefix);
        }
    }

    Ok(())
}
