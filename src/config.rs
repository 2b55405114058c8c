//! Server runtime configuration.

use clap::Parser;
use rand::thread_rng;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use crate::member::MemberType;

/// Invalid local configuration. Fatal at startup: the server refuses to
/// spawn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("cluster_name must not be empty")]
    EmptyClusterName,

    #[error("max_in_flight_appends must be at least 1, got {got}")]
    NoInFlightAppends { got: u64 },

    #[error("election timeout: min({min}) must be < max({max})")]
    ElectionTimeout { min: u64, max: u64 },

    #[error("heartbeat_interval({heartbeat}) must be < election_timeout_min({min})")]
    HeartbeatTooSlow { heartbeat: u64, min: u64 },
}

/// Runtime options of one cluster server.
///
/// All fields are validated at construction by [`Config::validate`]; the
/// server constructor rejects an invalid configuration instead of patching it
/// up.
#[derive(Clone, Debug, PartialEq, Parser)]
#[derive(Serialize, Deserialize)]
pub struct Config {
    /// Name of this cluster, used in logging.
    #[clap(long, default_value = "cluster")]
    pub cluster_name: String,

    /// Upper bound on pipelined append RPCs per follower. This is the only
    /// replication backpressure mechanism; there is no timeout-based
    /// cancellation of in-flight appends at this layer.
    #[clap(long, default_value = "32")]
    pub max_in_flight_appends: u64,

    /// Interval in milliseconds at which the leader sends heartbeats.
    #[clap(long, default_value = "250")]
    pub heartbeat_interval: u64,

    /// Minimum election timeout in milliseconds.
    #[clap(long, default_value = "1500")]
    pub election_timeout_min: u64,

    /// Maximum election timeout in milliseconds.
    #[clap(long, default_value = "3000")]
    pub election_timeout_max: u64,

    /// Initial election-priority hint of this server. Can be changed at
    /// runtime without a configuration round-trip.
    #[clap(long, default_value = "0")]
    pub election_priority: u32,

    /// The member type this server requests when joining a cluster.
    #[clap(skip = MemberType::Active)]
    #[serde(default = "default_join_member_type")]
    pub join_member_type: MemberType,
}

fn default_join_member_type() -> MemberType {
    MemberType::Active
}

impl Default for Config {
    fn default() -> Self {
        <Self as Parser>::parse_from(Vec::<&'static str>::new())
    }
}

impl Config {
    /// Build a `Config` from command-line style arguments, e.g.
    /// `&["raft-cluster", "--election-timeout-min=300"]`, and validate it.
    pub fn build(args: &[&str]) -> Result<Config, ConfigError> {
        let config = <Self as Parser>::parse_from(args);
        config.validate()
    }

    /// Generate a randomized election timeout within the configured range.
    pub fn new_rand_election_timeout(&self) -> u64 {
        thread_rng().gen_range(self.election_timeout_min..self.election_timeout_max)
    }

    /// Validate the state of this config.
    pub fn validate(self) -> Result<Config, ConfigError> {
        if self.cluster_name.is_empty() {
            return Err(ConfigError::EmptyClusterName);
        }

        if self.max_in_flight_appends == 0 {
            return Err(ConfigError::NoInFlightAppends {
                got: self.max_in_flight_appends,
            });
        }

        if self.election_timeout_min >= self.election_timeout_max {
            return Err(ConfigError::ElectionTimeout {
                min: self.election_timeout_min,
                max: self.election_timeout_max,
            });
        }

        if self.heartbeat_interval >= self.election_timeout_min {
            return Err(ConfigError::HeartbeatTooSlow {
                heartbeat: self.heartbeat_interval,
                min: self.election_timeout_min,
            });
        }

        Ok(self)
    }
}
