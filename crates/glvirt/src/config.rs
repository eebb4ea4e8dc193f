//! Runtime configuration, read from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use glvirt_state::LayoutCaps;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtConfig {
    /// Upper bound on tracked texture units, whatever the device reports.
    pub max_texture_units: u32,
    /// Indexed uniform-buffer bindings captured and synchronized.
    pub indexed_uniform_bindings: u32,
    /// How long a blocking call waits for the consumer. `None` waits forever.
    pub response_timeout: Option<Duration>,
    pub track_vertex_arrays: bool,
}

impl Default for VirtConfig {
    fn default() -> Self {
        Self {
            max_texture_units: 32,
            indexed_uniform_bindings: 8,
            response_timeout: None,
            track_vertex_arrays: true,
        }
    }
}

impl VirtConfig {
    /// Defaults overridden by `GLVIRT_MAX_TEXTURE_UNITS`,
    /// `GLVIRT_INDEXED_BINDINGS` and `GLVIRT_RESPONSE_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each setting.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(units) = setting(&lookup, "GLVIRT_MAX_TEXTURE_UNITS") {
            config.max_texture_units = units;
        }
        if let Some(bindings) = setting(&lookup, "GLVIRT_INDEXED_BINDINGS") {
            config.indexed_uniform_bindings = bindings;
        }
        if let Some(ms) = setting::<u64>(&lookup, "GLVIRT_RESPONSE_TIMEOUT_MS") {
            config.response_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        config
    }

    pub fn layout_caps(&self) -> LayoutCaps {
        LayoutCaps {
            max_texture_units: self.max_texture_units,
            indexed_uniform_bindings: self.indexed_uniform_bindings,
            track_vertex_arrays: self.track_vertex_arrays,
        }
    }
}

fn setting<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(name, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn settings_override_defaults() {
        let config = VirtConfig::from_lookup(lookup(&[
            ("GLVIRT_MAX_TEXTURE_UNITS", "4"),
            ("GLVIRT_INDEXED_BINDINGS", "not a number"),
            ("GLVIRT_RESPONSE_TIMEOUT_MS", "250"),
        ]));
        assert_eq!(config.max_texture_units, 4);
        assert_eq!(config.indexed_uniform_bindings, 8);
        assert_eq!(config.response_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.layout_caps().max_texture_units, 4);
    }

    #[test]
    fn zero_timeout_waits_forever() {
        let config = VirtConfig::from_lookup(lookup(&[("GLVIRT_RESPONSE_TIMEOUT_MS", "0")]));
        assert_eq!(config.response_timeout, None);
        assert_eq!(VirtConfig::from_lookup(|_| None), VirtConfig::default());
    }
}
