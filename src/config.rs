use std::ffi::OsString;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::limiter::Limits;
use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub data_dir: PathBuf,
    /// The page served on `GET /`.
    pub page: PathBuf,
    /// How often chunks are flushed and evicted and stats/identities saved.
    pub save_interval: Duration,
    pub stats_interval: Duration,
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            data_dir: PathBuf::from("data"),
            page: PathBuf::from("index.html"),
            save_interval: Duration::from_secs(30),
            stats_interval: Duration::from_secs(5),
            limits: Limits::default(),
        }
    }
}

fn invalid(name: &str, value: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("invalid {name}: {value:?}"))
}

fn parse_var<T: std::str::FromStr>(name: &str, value: Option<String>) -> io::Result<Option<T>> {
    value
        .map(|v| v.trim().parse().map_err(|_| invalid(name, &v)))
        .transpose()
}

impl Config {
    /// Defaults, overridden by the environment, then by the data directory
    /// given as the first argument.
    pub fn from_env(mut args: impl Iterator<Item = OsString>) -> io::Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok(), args.nth(1))
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>, data_arg: Option<OsString>) -> io::Result<Self> {
        let mut config = Self::default();
        if let Some(port) = parse_var::<u16>("PORT", var("PORT"))? {
            config.listen.set_port(port);
        }
        if let Some(dir) = var("DATA_DIR") {
            config.data_dir = dir.into();
        }
        if let Some(dir) = data_arg {
            config.data_dir = dir.into();
        }
        if let Some(page) = var("INDEX_HTML") {
            config.page = page.into();
        }
        if let Some(secs) = parse_var::<u64>("SAVE_INTERVAL_SECS", var("SAVE_INTERVAL_SECS"))? {
            config.save_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_var::<u64>("STATS_INTERVAL_SECS", var("STATS_INTERVAL_SECS"))? {
            config.stats_interval = Duration::from_secs(secs.max(1));
        }
        Ok(config)
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
    pub fn map_dir(&self) -> PathBuf {
        self.data_dir.join("map")
    }
    pub fn stats_file(&self) -> PathBuf {
        self.data_dir.join("stats.json")
    }
    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_the_public_server() {
        let config = Config::from_vars(vars(&[]), None).unwrap();
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.users_file(), PathBuf::from("data").join("users.json"));
        assert_eq!(config.map_dir(), PathBuf::from("data").join("map"));
        assert_eq!(config.save_interval, Duration::from_secs(30));
    }

    #[test]
    fn environment_and_argument_override() {
        let config = Config::from_vars(
            vars(&[("PORT", "9001"), ("DATA_DIR", "/var/grid"), ("STATS_INTERVAL_SECS", "2")]),
            Some("/srv/grid".into()),
        )
        .unwrap();
        assert_eq!(config.listen.port(), 9001);
        assert_eq!(config.data_dir, PathBuf::from("/srv/grid"));
        assert_eq!(config.stats_interval, Duration::from_secs(2));
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = Config::from_vars(vars(&[("PORT", "eighty")]), None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
