use etcetera::BaseStrategy;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Metadata, Provider,
};


lazy_static::lazy_static! {
    /// Provide a lazily instantiated static reference to
    /// a config object parsed from canonical locations
    /// so that applications have immutable access to it from
    /// anywhere without ever having to parse the config more
    /// than once.
    pub static ref CONFIG: Config = load_config();
}

fn load_config() -> Config {
    Config::figment().extract().unwrap_or_default()
}

const CONFIG_FILE: &str = "atpkgs.toml";
const ENV_PREFIX: &str = "ATPKGS_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub identity: Identity,
    pub registry: Registry,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Server {
    /// Address the registry listens on.
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Identity {
    /// Base URL of a service answering `com.bad-example.identity.resolveMiniDoc`.
    pub resolver: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Registry {
    /// Reported as both `time.created` and `time.modified` of every packument.
    pub fake_time: String,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 8787)),
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Identity {
            resolver: "https://slingshot.microcosm.blue".into(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry {
            fake_time: "2025-01-01T00:00:00.000Z".into(),
        }
    }
}

impl Config {
    pub fn from<T: Provider>(provider: T) -> Result<Config, figment::Error> {
        Figment::from(provider).extract()
    }

    pub fn figment() -> Figment {
        let mut fig = Figment::from(Config::default());

        if let Ok(c) = etcetera::choose_base_strategy() {
            let config = c.config_dir().join(CONFIG_FILE);
            fig = fig.admerge(Toml::file(config));
        }

        fig.admerge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

impl Provider for Config {
    fn metadata(&self) -> figment::Metadata {
        Metadata::named("atpkgs config")
    }
    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(self).data()
    }
}
