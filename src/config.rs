use crate::domain::services::PlacementPolicy;
use crate::domain::value_objects::IpRange;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Which half of the system this process runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    Scheduler,
    Adapter,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduler" => Ok(Self::Scheduler),
            "adapter" => Ok(Self::Adapter),
            other => Err(format!("unknown role {:?}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduler => write!(f, "scheduler"),
            Self::Adapter => write!(f, "adapter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub debug: bool,
    pub health_addr: SocketAddr,

    // Upstream provider (scheduler)
    pub api_url: Option<String>,
    pub api_batch_size: usize,
    pub api_polling_interval_secs: u64,
    pub api_timeout_secs: u64,
    pub api_cert_file: Option<String>,
    pub api_key_file: Option<String>,
    pub api_ca_file: Option<String>,
    pub api_skip_cert_verify: bool,
    pub blacklist: Vec<IpRange>,
    pub require_opt_in: bool,

    // Adapter fleet (scheduler)
    pub adapter_addrs: Vec<String>,
    pub adapter_common_name: String,
    pub rpc_timeout_secs: u64,
    pub placement: PlacementPolicy,
    pub max_create_attempts: usize,

    // Control-plane mTLS (both roles)
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub ca_file: Option<String>,

    // Adapter
    pub adapter_listen_addr: SocketAddr,
    pub ingress_addr: SocketAddr,
    pub dial_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub skip_cert_verify: bool,
    pub egress_ca_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::Scheduler,
            debug: false,
            health_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            api_url: None,
            api_batch_size: 50,
            api_polling_interval_secs: 15,
            api_timeout_secs: 5,
            api_cert_file: None,
            api_key_file: None,
            api_ca_file: None,
            api_skip_cert_verify: false,
            blacklist: Vec::new(),
            require_opt_in: false,
            adapter_addrs: Vec::new(),
            adapter_common_name: "adapter".to_string(),
            rpc_timeout_secs: 5,
            placement: PlacementPolicy::LeastBindings,
            max_create_attempts: 3,
            cert_file: None,
            key_file: None,
            ca_file: None,
            adapter_listen_addr: SocketAddr::from(([0, 0, 0, 0], 4443)),
            ingress_addr: SocketAddr::from(([0, 0, 0, 0], 4444)),
            dial_timeout_ms: 5000,
            write_timeout_ms: 5000,
            skip_cert_verify: false,
            egress_ca_file: None,
        }
    }
}

impl Config {
    pub fn api_polling_interval(&self) -> Duration {
        Duration::from_secs(self.api_polling_interval_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Read every setting through `lookup`, then validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Config::default();
        let env = Env(&lookup);

        let cfg = Config {
            role: env.parsed("DRAIN_ROUTER_ROLE", d.role)?,
            debug: lookup("DEBUG").is_some(),
            health_addr: env.parsed("DRAIN_ROUTER_HEALTH_ADDR", d.health_addr)?,

            api_url: env.string("DRAIN_ROUTER_API_URL"),
            api_batch_size: env.parsed("DRAIN_ROUTER_API_BATCH_SIZE", d.api_batch_size)?,
            api_polling_interval_secs: env
                .parsed("DRAIN_ROUTER_API_POLLING_INTERVAL_SECS", d.api_polling_interval_secs)?,
            api_timeout_secs: env.parsed("DRAIN_ROUTER_API_TIMEOUT_SECS", d.api_timeout_secs)?,
            api_cert_file: env.string("DRAIN_ROUTER_API_CERT_FILE"),
            api_key_file: env.string("DRAIN_ROUTER_API_KEY_FILE"),
            api_ca_file: env.string("DRAIN_ROUTER_API_CA_FILE"),
            api_skip_cert_verify: env.flag("DRAIN_ROUTER_API_SKIP_CERT_VERIFY"),
            blacklist: env.list("DRAIN_ROUTER_BLACKLIST")?,
            require_opt_in: env.flag("DRAIN_ROUTER_REQUIRE_OPT_IN"),

            adapter_addrs: env.list("DRAIN_ROUTER_ADAPTER_ADDRS")?,
            adapter_common_name: env
                .string("DRAIN_ROUTER_ADAPTER_COMMON_NAME")
                .unwrap_or(d.adapter_common_name),
            rpc_timeout_secs: env.parsed("DRAIN_ROUTER_RPC_TIMEOUT_SECS", d.rpc_timeout_secs)?,
            placement: env.parsed("DRAIN_ROUTER_PLACEMENT", d.placement)?,
            max_create_attempts: env
                .parsed("DRAIN_ROUTER_CREATE_ATTEMPTS", d.max_create_attempts)?,

            cert_file: env.string("DRAIN_ROUTER_CERT_FILE"),
            key_file: env.string("DRAIN_ROUTER_KEY_FILE"),
            ca_file: env.string("DRAIN_ROUTER_CA_FILE"),

            adapter_listen_addr: env
                .parsed("DRAIN_ROUTER_ADAPTER_LISTEN_ADDR", d.adapter_listen_addr)?,
            ingress_addr: env.parsed("DRAIN_ROUTER_INGRESS_ADDR", d.ingress_addr)?,
            dial_timeout_ms: env.parsed("DRAIN_ROUTER_DIAL_TIMEOUT_MS", d.dial_timeout_ms)?,
            write_timeout_ms: env.parsed("DRAIN_ROUTER_WRITE_TIMEOUT_MS", d.write_timeout_ms)?,
            skip_cert_verify: env.flag("DRAIN_ROUTER_SKIP_CERT_VERIFY"),
            egress_ca_file: env.string("DRAIN_ROUTER_EGRESS_CA_FILE"),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check cross-field requirements for the configured role.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cert_file.is_none() {
            return Err(ConfigError::Missing("DRAIN_ROUTER_CERT_FILE"));
        }
        if self.key_file.is_none() {
            return Err(ConfigError::Missing("DRAIN_ROUTER_KEY_FILE"));
        }
        if self.ca_file.is_none() {
            return Err(ConfigError::Missing("DRAIN_ROUTER_CA_FILE"));
        }

        match self.role {
            Role::Scheduler => {
                if self.api_url.is_none() {
                    return Err(ConfigError::Missing("DRAIN_ROUTER_API_URL"));
                }
                if self.adapter_addrs.is_empty() {
                    return Err(ConfigError::Missing("DRAIN_ROUTER_ADAPTER_ADDRS"));
                }
                if self.api_cert_file.is_some() != self.api_key_file.is_some() {
                    return Err(ConfigError::Inconsistent(
                        "DRAIN_ROUTER_API_CERT_FILE and DRAIN_ROUTER_API_KEY_FILE must be set together"
                            .to_string(),
                    ));
                }
                positive("DRAIN_ROUTER_API_BATCH_SIZE", self.api_batch_size as u64)?;
                positive("DRAIN_ROUTER_API_POLLING_INTERVAL_SECS", self.api_polling_interval_secs)?;
                positive("DRAIN_ROUTER_API_TIMEOUT_SECS", self.api_timeout_secs)?;
                positive("DRAIN_ROUTER_RPC_TIMEOUT_SECS", self.rpc_timeout_secs)?;
                positive("DRAIN_ROUTER_CREATE_ATTEMPTS", self.max_create_attempts as u64)?;
            }
            Role::Adapter => {
                if self.ingress_addr == self.adapter_listen_addr {
                    return Err(ConfigError::Inconsistent(
                        "DRAIN_ROUTER_INGRESS_ADDR and DRAIN_ROUTER_ADAPTER_LISTEN_ADDR must differ"
                            .to_string(),
                    ));
                }
                positive("DRAIN_ROUTER_DIAL_TIMEOUT_MS", self.dial_timeout_ms)?;
                positive("DRAIN_ROUTER_WRITE_TIMEOUT_MS", self.write_timeout_ms)?;
            }
        }
        Ok(())
    }
}

pub fn load_config() -> Result<Config, ConfigError> {
    Config::from_lookup(|key| std::env::var(key).ok())
}

fn positive(var: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-blank.
    fn string(&self, var: &'static str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn flag(&self, var: &'static str) -> bool {
        self.string(var)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false)
    }

    fn parsed<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.string(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    /// Comma separated, blanks skipped.
    fn list<T>(&self, var: &'static str) -> Result<Vec<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(raw) = self.string(var) else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|item| {
                item.parse().map_err(|e: T::Err| ConfigError::Invalid {
                    var,
                    value: item.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}
