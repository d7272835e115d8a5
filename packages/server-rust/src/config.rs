//! Command-line configuration for the cacher server.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::manager::CacheOptions;

/// Which network surface the server binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Interface {
    /// The request/response JSON API.
    Http,
    /// The line-oriented shell.
    Telnet,
}

/// Server options.
#[derive(Debug, Clone, Parser)]
#[command(name = "cacher", version, about = "In-memory Redis-like cache.")]
pub struct Config {
    /// Either http or telnet interface enable.
    #[arg(short, long, value_enum, default_value_t = Interface::Http)]
    pub interface: Interface,

    /// Server address.
    #[arg(short = 'a', long = "server", default_value = "127.0.0.1")]
    pub server: IpAddr,

    /// Server port.
    #[arg(short, long, default_value_t = 1323)]
    pub port: u16,

    /// Bearer authentication token, required for the http interface.
    #[arg(long = "auth_token", env = "CACHER_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Select cache implementation: mutex-map or sync-map.
    #[arg(short = 't', long = "cache_type", default_value = "mutex-map")]
    pub cache_type: String,

    /// Keep an on-disk snapshot of the keyspace.
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub cdb: bool,

    /// Snapshot flush period in seconds; 0 or less writes through directly.
    #[arg(long = "cdb_period", default_value_t = 60)]
    pub cdb_period: i64,

    /// Append every mutation to the operation log.
    #[arg(long, action = ArgAction::Set, default_value_t = false)]
    pub aof: bool,

    /// Root directory for the snapshot store and the operation log.
    #[arg(long = "data_dir", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Directory for the process log.
    #[arg(long = "log_dir", default_value = "./log")]
    pub log_dir: PathBuf,
}

/// Configuration errors, all fatal at init.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("the http interface requires an auth token; set --auth_token")]
    MissingAuthToken,
}

impl Config {
    /// Checks cross-option constraints.
    ///
    /// # Errors
    ///
    /// Fails when the http interface is selected without an auth token.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface == Interface::Http
            && self.auth_token.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::MissingAuthToken);
        }
        Ok(())
    }

    /// The `host:port` string both surfaces bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// The manager-facing subset of the options.
    #[must_use]
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            cache_type: self.cache_type.clone(),
            cdb_enabled: self.cdb,
            cdb_period: self.cdb_period,
            aof_enabled: self.aof,
            data_dir: self.data_dir.clone(),
        }
    }
}
