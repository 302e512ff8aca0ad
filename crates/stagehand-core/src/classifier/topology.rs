//! Desired classification state derived from the pool topology.

use serde_json::json;

use super::ClassParams;
use crate::config::{ClassifierConfig, Config};

/// Addresses agents connect to, derived from the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTopology {
    pub primary: String,
    pub pool_address: String,
    pub server_port: u16,
    pub broker_port: u16,
}

/// Desired parameters of one class on one named group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSetting {
    pub group: String,
    pub class: String,
    pub params: ClassParams,
}

impl PoolTopology {
    pub fn from_config(config: &Config) -> Self {
        Self {
            primary: config.inventory.primary.clone(),
            pool_address: config.inventory.pool_address.clone(),
            server_port: config.topology.server_port,
            broker_port: config.topology.broker_port,
        }
    }

    fn endpoints(&self, host: &str) -> ClassParams {
        ClassParams::from([
            (
                "server_list".to_string(),
                json!([format!("{}:{}", host, self.server_port)]),
            ),
            (
                "pcp_broker_list".to_string(),
                json!([format!("{}:{}", host, self.broker_port)]),
            ),
        ])
    }

    /// Ordinary agents go through the pool; infrastructure agents talk to the primary.
    pub fn desired_settings(&self, config: &ClassifierConfig) -> Vec<GroupSetting> {
        vec![
            GroupSetting {
                group: config.agent_group.clone(),
                class: config.agent_class.clone(),
                params: self.endpoints(&self.pool_address),
            },
            GroupSetting {
                group: config.secondary_agent_group.clone(),
                class: config.agent_class.clone(),
                params: self.endpoints(&self.primary),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agents_point_at_pool_and_infrastructure_at_primary() {
        let topology = PoolTopology::from_config(&Config::default());
        let settings = topology.desired_settings(&ClassifierConfig::default());

        assert_eq!(settings.len(), 2);
        assert_eq!(settings[0].group, "Agent Group");
        assert_eq!(settings[0].params["server_list"], json!(["compile.vm:8140"]));
        assert_eq!(settings[0].params["pcp_broker_list"], json!(["compile.vm:8142"]));
        assert_eq!(settings[1].group, "Secondary Agent Group");
        assert_eq!(settings[1].params["server_list"], json!(["master.vm:8140"]));
        assert_eq!(settings[1].params["pcp_broker_list"], json!(["master.vm:8142"]));
    }
}
