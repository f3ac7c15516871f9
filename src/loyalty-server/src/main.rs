//! Loyalty Engine — points configuration, accrual, tiers, and referral
//! rewards for the marketplace.
//!
//! Main entry point that wires the stores and engines together and starts
//! the server.

use clap::Parser;
use loyalty_api::ApiServer;
use loyalty_core::config::AppConfig;
use loyalty_core::event_bus::noop_sink;
use loyalty_earning::{EarningEngine, FixedMultiplier};
use loyalty_ledger::LedgerStore;
use loyalty_referrals::ReferralTracker;
use loyalty_registry::models::*;
use loyalty_registry::ConfigRegistry;
use loyalty_tiers::TierEvaluator;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "loyalty-server")]
#[command(about = "Marketplace loyalty points and rewards engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "LOYALTY__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "LOYALTY__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Seed a demo rule-set (development only)
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loyalty_server=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Loyalty engine starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        sweep_interval_secs = config.engine.sweep_interval_secs,
        "Configuration loaded"
    );

    // Wire stores and engines. Production: route events to the
    // notification pipeline instead of the no-op sink.
    let events = noop_sink();
    let registry = Arc::new(ConfigRegistry::new(events.clone()));
    let ledger = Arc::new(LedgerStore::new(events.clone()));
    let tiers = Arc::new(TierEvaluator::new(
        registry.clone(),
        ledger.clone(),
        events.clone(),
    ));
    let engine = Arc::new(EarningEngine::new(
        registry.clone(),
        ledger.clone(),
        tiers.clone(),
        Arc::new(FixedMultiplier(config.engine.default_campaign_multiplier)),
        events.clone(),
    ));
    let referrals = Arc::new(ReferralTracker::new(
        registry.clone(),
        ledger.clone(),
        events.clone(),
    ));

    if cli.seed_demo {
        seed_demo_data(&registry);
        info!("Demo rule-set seeded");
    }

    let api_server = ApiServer::new(
        config.clone(),
        registry,
        ledger,
        engine,
        tiers.clone(),
        referrals,
    );

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Spawn the tier downgrade sweep
    let sweep_interval = std::time::Duration::from_secs(config.engine.sweep_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let downgraded = tiers.run_downgrade_sweep(chrono::Utc::now());
            if downgraded > 0 {
                info!(downgraded = downgraded, "Downgrade sweep applied");
            }
        }
    });

    info!("Loyalty engine is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}

/// Development fixture: an activated configuration with a plausible
/// three-tier rule-set.
fn seed_demo_data(registry: &ConfigRegistry) {
    let config = registry.create_configuration(
        CreateConfigurationRequest {
            points_enabled: true,
            redemption_enabled: true,
            allow_stacking: true,
        },
        "seed",
    );
    if let Err(e) = registry.activate(config.id, "seed") {
        error!(error = %e, "Demo seed: activation failed");
        return;
    }

    let tiers = [
        ("Bronze", 1u32, 0i64, 1.0f64, None),
        ("Silver", 2, 2_000, 1.25, None),
        ("Gold", 3, 10_000, 1.5, Some(0)),
    ];
    for (name, level, min_points, multiplier, expiry_override) in tiers {
        let result = registry.create_tier(
            CreateTierRequest {
                tier_level: level,
                name: name.to_string(),
                min_points,
                multiplier,
                can_gift_points: level > 1,
                max_gift_per_month: Some(5_000),
                expiry_override_days: expiry_override,
                downgrade_after_inactive_days: 90,
                evaluation_window: loyalty_core::types::EvaluationWindow::Days(365),
                active: true,
            },
            "seed",
        );
        if let Err(e) = result {
            error!(error = %e, tier = name, "Demo seed: tier failed");
        }
    }

    let rules = [
        (loyalty_core::types::SourceType::Purchase, 10i64, 365u32),
        (loyalty_core::types::SourceType::Review, 25, 180),
        (loyalty_core::types::SourceType::Signup, 100, 365),
    ];
    for (source, points, expiry_days) in rules {
        let expiry = registry.create_expiry_rule(
            CreateExpiryRuleRequest {
                expiry_type: source,
                expiry_mode: loyalty_core::types::ExpiryMode::Rolling,
                expiry_days,
                fixed_day_of_month: 1,
                grace_period_days: 30,
                warning_days_before: 14,
                send_expiry_notifications: true,
                active: true,
            },
            "seed",
        );
        let expiry = match expiry {
            Ok(rule) => rule,
            Err(e) => {
                error!(error = %e, source = %source, "Demo seed: expiry rule failed");
                continue;
            }
        };
        if let Err(e) = registry.create_earning_rule(
            CreateEarningRuleRequest {
                rule_name: format!("{} points", source),
                source_type: source,
                points_awarded: points,
                expiry_rule_id: expiry.id,
                enabled: true,
                description: None,
            },
            "seed",
        ) {
            error!(error = %e, source = %source, "Demo seed: earning rule failed");
        }
    }
}
