//! API server — assembles the engine and admin routers into one HTTP app.

use crate::rest::{self, AppState};
use crate::{points_rest, referral_rest};
use axum::routing::{get, post};
use axum::Router;
use loyalty_core::config::AppConfig;
use loyalty_earning::EarningEngine;
use loyalty_ledger::LedgerStore;
use loyalty_management::admin_router;
use loyalty_referrals::ReferralTracker;
use loyalty_registry::ConfigRegistry;
use loyalty_tiers::TierEvaluator;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Main API server for the loyalty engine.
pub struct ApiServer {
    config: AppConfig,
    registry: Arc<ConfigRegistry>,
    ledger: Arc<LedgerStore>,
    engine: Arc<EarningEngine>,
    tiers: Arc<TierEvaluator>,
    referrals: Arc<ReferralTracker>,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        registry: Arc<ConfigRegistry>,
        ledger: Arc<LedgerStore>,
        engine: Arc<EarningEngine>,
        tiers: Arc<TierEvaluator>,
        referrals: Arc<ReferralTracker>,
    ) -> Self {
        Self {
            config,
            registry,
            ledger,
            engine,
            tiers,
            referrals,
        }
    }

    /// Build the full application router.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            ledger: self.ledger.clone(),
            engine: self.engine.clone(),
            tiers: self.tiers.clone(),
            referrals: self.referrals.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        Router::new()
            // Points
            .route("/v1/points/award", post(points_rest::handle_award))
            .route("/v1/points/redeem", post(points_rest::handle_redeem))
            .route("/v1/points/balance/:user_id", get(points_rest::handle_balance))
            .route("/v1/points/ledger/:user_id", get(points_rest::handle_ledger))
            .route("/v1/points/expiring/:user_id", get(points_rest::handle_expiring))
            // Tiers
            .route("/v1/tiers/current/:user_id", get(points_rest::handle_current_tier))
            // Referrals
            .route("/v1/referrals/signup", post(referral_rest::handle_signup))
            .route("/v1/referrals/purchase", post(referral_rest::handle_purchase))
            .route("/v1/referrals/progress/:referrer_id", get(referral_rest::handle_progress))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
            // Admin surface shares the registry.
            .merge(admin_router(self.registry.clone()))
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points_rest::{self, AwardPointsRequest, RedeemPointsRequest};
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;
    use loyalty_core::event_bus::noop_sink;
    use loyalty_core::types::{ExpiryMode, SourceType};
    use loyalty_earning::FixedMultiplier;
    use loyalty_registry::models::*;

    fn test_state() -> (ApiServer, AppState) {
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
            Arc::new(FixedMultiplier(1.0)),
            events.clone(),
        ));
        let referrals = Arc::new(ReferralTracker::new(
            registry.clone(),
            ledger.clone(),
            events,
        ));
        let server = ApiServer::new(
            AppConfig::default(),
            registry.clone(),
            ledger.clone(),
            engine.clone(),
            tiers.clone(),
            referrals.clone(),
        );
        let state = AppState {
            registry,
            ledger,
            engine,
            tiers,
            referrals,
            node_id: "test".into(),
            start_time: Instant::now(),
        };
        (server, state)
    }

    fn seed_rules(state: &AppState) {
        let config = state.registry.create_configuration(
            CreateConfigurationRequest {
                points_enabled: true,
                redemption_enabled: true,
                allow_stacking: true,
            },
            "test",
        );
        state.registry.activate(config.id, "test").unwrap();
        let expiry = state
            .registry
            .create_expiry_rule(
                CreateExpiryRuleRequest {
                    expiry_type: SourceType::Purchase,
                    expiry_mode: ExpiryMode::Rolling,
                    expiry_days: 180,
                    fixed_day_of_month: 1,
                    grace_period_days: 0,
                    warning_days_before: 14,
                    send_expiry_notifications: true,
                    active: true,
                },
                "test",
            )
            .unwrap();
        state
            .registry
            .create_earning_rule(
                CreateEarningRuleRequest {
                    rule_name: "Purchase points".into(),
                    source_type: SourceType::Purchase,
                    points_awarded: 10,
                    expiry_rule_id: expiry.id,
                    enabled: true,
                    description: None,
                },
                "test",
            )
            .unwrap();
    }

    #[test]
    fn test_router_builds() {
        let (server, _) = test_state();
        let _router = server.router();
    }

    #[tokio::test]
    async fn test_award_then_balance_flow() {
        let (_, state) = test_state();
        seed_rules(&state);

        let (status, Json(env)) = points_rest::handle_award(
            State(state.clone()),
            Json(AwardPointsRequest {
                user_id: "u-1".into(),
                source_type: SourceType::Purchase,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(env.data.unwrap().points_delta, 10);

        let (status, Json(env)) =
            points_rest::handle_balance(State(state), Path("u-1".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(env.data.unwrap().balance, 10);
    }

    #[tokio::test]
    async fn test_award_without_configuration_maps_to_422() {
        let (_, state) = test_state();

        let (status, Json(env)) = points_rest::handle_award(
            State(state),
            Json(AwardPointsRequest {
                user_id: "u-1".into(),
                source_type: SourceType::Purchase,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(env.error.as_deref(), Some("invalid_state"));
    }

    #[tokio::test]
    async fn test_redeem_more_than_balance_maps_to_400() {
        let (_, state) = test_state();
        seed_rules(&state);

        let (status, Json(env)) = points_rest::handle_redeem(
            State(state),
            Json(RedeemPointsRequest {
                user_id: "u-1".into(),
                points: 999,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(env.error.as_deref(), Some("validation_error"));
    }
}
