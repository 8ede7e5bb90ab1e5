use pgnet::{NetworkConfig, SystemFlags};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub echo: bool,
    pub broadcast_echo: bool,
}

impl ServerConfig {
    pub fn flags(&self) -> &SystemFlags {
        &self.network.flags
    }
}
