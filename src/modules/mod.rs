//! Module workflow — registry-backed integrations, per-user configuration,
//! per-chat enablement, and the assistant request flow.

pub mod model;
pub mod routes;
pub mod runtime;
pub mod service;

pub use model::{Module, ModuleOverview, ModuleRequest, RequestState};
pub use routes::module_routes;
pub use runtime::RuntimeEnv;
pub use service::{ModuleService, RequestDecision};
