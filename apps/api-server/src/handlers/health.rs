//! Health check endpoint.

use actix_web::{HttpResponse, web};

use stratus_core::ports::Clock;
use stratus_infra::resilience::{CircuitBreakerSnapshot, CircuitState};
use stratus_shared::dto::{BreakerHealth, HealthResponse};

use crate::state::AppState;

/// GET /api/health
///
/// Reports `degraded` while any dependency's circuit is not closed.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let breakers: Vec<BreakerHealth> = state.breakers.snapshots().into_iter().map(breaker_health).collect();
    let status = if breakers.iter().all(|b| b.state == "closed") {
        "ok"
    } else {
        "degraded"
    };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: state.clock.now(),
        breakers,
    })
}

fn breaker_health(snapshot: CircuitBreakerSnapshot) -> BreakerHealth {
    let state = match snapshot.state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    };

    BreakerHealth {
        name: snapshot.name,
        state: state.to_string(),
        failure_count: snapshot.failure_count,
        last_failure_time: snapshot.last_failure_time,
        next_attempt_time: snapshot.next_attempt_time,
    }
}
