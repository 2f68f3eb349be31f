// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use std::env;
use std::fs;
use std::path::Path;

use crate::accumulator::DEFAULT_RAW_BUFFER_SIZE;
use crate::error::{Error, Result};
use crate::pkcs11::*;

use serde::{Deserialize, Serialize};

#[cfg(not(test))]
const DEFAULT_CONF_DIR: &str = {
    match option_env!("CONFDIR") {
        Some(p) => p,
        None => "/usr/local/etc",
    }
};
#[cfg(test)]
const DEFAULT_CONF_DIR: &str = "test";

pub const DEFAULT_CONF_NAME: &str = "pivmech.conf";

const MIN_RAW_BUFFER_SIZE: usize = 64;
const MAX_RAW_BUFFER_SIZE: usize = 65536;

fn default_raw_buffer_size() -> usize {
    DEFAULT_RAW_BUFFER_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Capacity of the buffer used by mechanisms that consume the
    /// message unhashed (raw ECDSA, EdDSA)
    #[serde(default = "default_raw_buffer_size")]
    pub raw_buffer_size: usize,
    /// Cryptoki names of mechanisms that must not be offered
    #[serde(default)]
    pub deny_mechanisms: Vec<String>,
    /// Refuse PSS salts longer than the hash output
    #[serde(default)]
    pub strict_pss_salt: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            raw_buffer_size: DEFAULT_RAW_BUFFER_SIZE,
            deny_mechanisms: Vec::new(),
            strict_pss_salt: false,
        }
    }
}

fn config_error<E>(error: E) -> Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Error::ck_rv_from_error(CKR_GENERAL_ERROR, error)
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn find_conf() -> Result<String> {
        /* First check for our own env var,
         * this has the highest precedence */
        if let Ok(var) = env::var("PIVMECH_CONF") {
            return Ok(var);
        }
        let mut candidates = Vec::with_capacity(3);
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            candidates.push(format!("{}/pivmech/{}", xdg, DEFAULT_CONF_NAME));
        }
        if let Ok(home) = env::var("HOME") {
            candidates.push(format!(
                "{}/.config/pivmech/{}",
                home, DEFAULT_CONF_NAME
            ));
        }
        candidates.push(format!(
            "{}/pivmech/{}",
            DEFAULT_CONF_DIR, DEFAULT_CONF_NAME
        ));
        match candidates.iter().find(|c| Path::new(c).is_file()) {
            Some(conffile) => Ok(conffile.clone()),
            None => Err(Error::not_found(candidates.join(", "))),
        }
    }

    pub fn from_str(conf: &str) -> Result<Config> {
        let conf: Config = toml::from_str(conf).map_err(config_error)?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn from_file(filename: &str) -> Result<Config> {
        let config_str = fs::read_to_string(filename)?;
        Config::from_str(&config_str)
    }

    /// Loads the configuration file if one can be found, falls back to
    /// defaults otherwise
    pub fn load() -> Result<Config> {
        match Config::find_conf() {
            Ok(filename) => Config::from_file(&filename),
            Err(e) if e.is_not_found() => Ok(Config::default()),
            Err(e) => Err(e),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.raw_buffer_size < MIN_RAW_BUFFER_SIZE
            || self.raw_buffer_size > MAX_RAW_BUFFER_SIZE
        {
            return Err(Error::ck_rv_with_errmsg(
                CKR_GENERAL_ERROR,
                format!(
                    "raw_buffer_size must be between {} and {}",
                    MIN_RAW_BUFFER_SIZE, MAX_RAW_BUFFER_SIZE
                ),
            ));
        }
        self.denied_mechanisms()?;
        Ok(())
    }

    /// Resolves the deny list to mechanism types
    pub fn denied_mechanisms(&self) -> Result<Vec<CK_MECHANISM_TYPE>> {
        let mut v = Vec::with_capacity(self.deny_mechanisms.len());
        for name in &self.deny_mechanisms {
            match mechanism_from_name(name) {
                Some(m) => v.push(m),
                None => {
                    return Err(Error::ck_rv_with_errmsg(
                        CKR_GENERAL_ERROR,
                        format!("unknown mechanism name {}", name),
                    ))
                }
            }
        }
        Ok(v)
    }
}
