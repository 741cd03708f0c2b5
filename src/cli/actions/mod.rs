pub mod server;

use crate::cli::config::ServiceConfig;

/// What the CLI resolved to; executed by the binary.
#[derive(Debug)]
pub enum Action {
    Server { config: ServiceConfig },
}
