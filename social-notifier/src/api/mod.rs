//! Read-only status API.
//!
//! - `GET /api/health` overall health and uptime
//! - `GET /api/status` scheduler phase and per-source health

mod routes;
mod server;

pub use routes::{HealthResponse, create_router};
pub use server::{ApiServer, ApiServerConfig, AppState};
