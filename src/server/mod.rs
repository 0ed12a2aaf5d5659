mod router;
mod state;

pub use router::{build_router, DEGRADED_HEADER};
pub use state::{GatewayState, ServeHealth, ServeHealthSnapshot};
