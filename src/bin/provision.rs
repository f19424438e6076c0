// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning CLI
//!
//! Loads an orchestration config, then either prints the execution plan or
//! runs it against the in-memory control plane and prints the deployment
//! outputs as JSON.
//!
//! Run with: cargo run --bin provision -- <config.json> [--plan]
//!
//! Environment:
//! - `AZURE_ENV_NAME`, `AZURE_LOCATION`, `AZURE_SUBSCRIPTION_ID`,
//!   `AZURE_RESOURCE_GROUP` override the config identity
//! - `NATS_URL` publishes run events to NATS when set

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cim_private_network::control_plane::Resource;
use cim_private_network::domain::ResourceKind;
use cim_private_network::events::CompositeSink;
use cim_private_network::resolver::parse_external;
use cim_private_network::{
    ControlPlane, DeploymentOutputs, EventSink, InMemoryControlPlane, NatsClient, NatsConfig,
    NatsEventSink, OrchestrationConfig, ProvisioningOrchestrator, ProvisioningPlan, TracingSink,
};
use serde_json::{json, Map};
use tracing::{info, warn};

struct CliArgs {
    config_path: String,
    plan_only: bool,
}

impl CliArgs {
    fn parse() -> Result<Self> {
        let mut config_path = None;
        let mut plan_only = false;
        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "--plan" => plan_only = true,
                flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
                path => config_path = Some(path.to_string()),
            }
        }
        Ok(Self {
            config_path: config_path.context("usage: provision <config.json> [--plan]")?,
            plan_only,
        })
    }
}

/// Seed the resources the config imports, so a simulated run can find them
fn seed_external(plane: &InMemoryControlPlane, config: &OrchestrationConfig) -> Result<()> {
    let seed = |raw: Option<&str>, kind: ResourceKind, properties: Map<String, serde_json::Value>| -> Result<()> {
        if let Some(id) = parse_external(raw, kind)? {
            info!("🌱 Simulating existing {} {}", kind, id.name());
            plane.insert(Resource {
                id,
                location: config.location.clone(),
                properties,
            });
        }
        Ok(())
    };

    if config.network.use_existing {
        let mut properties = Map::new();
        if let Some(space) = config.network.address_space {
            properties.insert(
                "addressSpace".into(),
                json!({ "addressPrefixes": [space.to_string()] }),
            );
        }
        seed(
            config.network.existing_network_id.as_deref(),
            ResourceKind::VirtualNetwork,
            properties,
        )?;
    }
    for service in &config.services {
        let mut properties = Map::new();
        properties.insert("publicNetworkAccess".into(), json!("Enabled"));
        seed(
            service.existing_resource_id.as_deref(),
            service.kind.resource_kind(),
            properties,
        )?;
    }
    for zone in config.existing_dns_zone_ids.values() {
        seed(Some(zone.as_str()), ResourceKind::PrivateDnsZone, Map::new())?;
    }
    for network in &config.discovery.consumer_network_ids {
        seed(Some(network.as_str()), ResourceKind::VirtualNetwork, Map::new())?;
    }
    if let Some(peering) = &config.peering {
        seed(
            Some(peering.remote_network_id.as_str()),
            ResourceKind::VirtualNetwork,
            Map::new(),
        )?;
    }
    Ok(())
}

async fn event_sink() -> Arc<dyn EventSink> {
    let Ok(url) = std::env::var("NATS_URL") else {
        return Arc::new(TracingSink);
    };
    info!("🔌 Connecting to NATS at {}", url);
    match NatsClient::new(NatsConfig::from_url(&url)).await {
        Ok(client) => {
            info!("✅ Publishing run events to NATS");
            Arc::new(CompositeSink::new(vec![
                Arc::new(TracingSink),
                Arc::new(NatsEventSink::new(client)),
            ]))
        }
        Err(e) => {
            warn!("NATS unavailable ({}); run events are logged only", e);
            Arc::new(TracingSink)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse()?;

    let mut config = OrchestrationConfig::from_path(&args.config_path)
        .with_context(|| format!("Failed to load {}", args.config_path))?;
    config.apply_env();
    info!("📋 Configuration loaded:");
    info!("  - Environment: {}", config.environment_name);
    info!("  - Location: {}", config.location);
    info!("  - Resource group: {}", config.resource_group);

    let plane = Arc::new(InMemoryControlPlane::new());
    let control_plane: Arc<dyn ControlPlane> = plane.clone();
    let plan = ProvisioningPlan::from_config(&config, control_plane).context("Invalid plan")?;

    if args.plan_only {
        println!("{}", serde_json::to_string_pretty(&plan.describe())?);
        return Ok(());
    }

    seed_external(&plane, &config)?;

    let orchestrator = ProvisioningOrchestrator::with_sink(event_sink().await);
    let report = orchestrator.run(&plan).await.map_err(|failure| {
        anyhow::anyhow!(
            "{} (unmet inputs: {:?}, blocked: {:?})",
            failure,
            failure.unmet_inputs.iter().map(ToString::to_string).collect::<Vec<_>>(),
            failure.blocked.iter().map(ToString::to_string).collect::<Vec<_>>()
        )
    })?;

    info!(
        "🏁 {} units completed, {} resources in simulated control plane",
        report.completed.len(),
        plane.resource_count()
    );

    let outputs = DeploymentOutputs::from_report(&report);
    println!("{}", outputs.to_json()?);

    Ok(())
}
