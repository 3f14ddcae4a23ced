//! HTTP trigger surface
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/api/sweep` | Start a sweep now (202, or 409 while one runs) |
//! | GET | `/api/sweep/last` | Report of the last finished sweep |
//! | GET | `/api/offers` | Persisted offers (`partition`, `state`, `limit`) |
//! | GET | `/api/offers/{id}` | One offer |
//! | GET | `/api/health` | Liveness and offer counts |
//! | GET | `/metrics` | Prometheus metrics |

pub mod api;
#[allow(clippy::module_inception)]
pub mod server;

pub use api::{create_router, ApiResponse, ErrorResponse};
pub use server::{ApiServer, AppState, ServerError};
