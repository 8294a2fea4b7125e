mod control_server;
mod health_server;
mod log_ingress;

pub use control_server::{dispatch, ControlServer};
pub use health_server::HealthServer;
pub use log_ingress::LogIngressServer;
