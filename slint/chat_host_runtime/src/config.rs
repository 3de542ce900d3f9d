use crate::event::StatePath;
use tracing::warn;

pub const SID_VAR: &str = "CHAT_HOST_SID";
pub const OUTBOUND_QUEUE_CAP_VAR: &str = "CHAT_HOST_OUTBOUND_QUEUE_CAP";
pub const STATE_PATH_VAR: &str = "CHAT_HOST_STATE_PATH";

const DEFAULT_SID: &str = "S1";
const DEFAULT_OUTBOUND_QUEUE_CAP: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub sid: String,
    pub outbound_queue_cap: usize,
    pub state_path: StatePath,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sid: DEFAULT_SID.to_string(),
            outbound_queue_cap: DEFAULT_OUTBOUND_QUEUE_CAP,
            state_path: StatePath::default(),
        }
    }
}

impl HostConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(sid) = lookup(SID_VAR).filter(|sid| !sid.is_empty()) {
            config.sid = sid;
        }

        if let Some(raw) = lookup(OUTBOUND_QUEUE_CAP_VAR) {
            match raw.parse::<usize>() {
                Ok(cap) if cap > 0 => config.outbound_queue_cap = cap,
                _ => warn!(
                    var = OUTBOUND_QUEUE_CAP_VAR,
                    value = %raw,
                    default = DEFAULT_OUTBOUND_QUEUE_CAP,
                    "ignoring invalid queue capacity"
                ),
            }
        }

        if let Some(path) = lookup(STATE_PATH_VAR).filter(|path| !path.is_empty()) {
            config.state_path = StatePath::new(path);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_environment() {
        assert_eq!(HostConfig::from_lookup(|_| None), HostConfig::default());
    }

    #[test]
    fn overrides_are_read_from_environment() {
        let config = HostConfig::from_lookup(lookup_from(&[
            (SID_VAR, "S9"),
            (OUTBOUND_QUEUE_CAP_VAR, "16"),
            (STATE_PATH_VAR, "app.chat_state"),
        ]));

        assert_eq!(config.sid, "S9");
        assert_eq!(config.outbound_queue_cap, 16);
        assert_eq!(config.state_path.as_str(), "app.chat_state");
    }

    #[test]
    fn invalid_queue_capacity_falls_back_to_default() {
        for raw in ["0", "-3", "lots"] {
            let config = HostConfig::from_lookup(lookup_from(&[(OUTBOUND_QUEUE_CAP_VAR, raw)]));
            assert_eq!(config.outbound_queue_cap, DEFAULT_OUTBOUND_QUEUE_CAP);
        }
    }

    #[test]
    fn empty_values_are_ignored() {
        let config = HostConfig::from_lookup(lookup_from(&[(SID_VAR, ""), (STATE_PATH_VAR, "")]));
        assert_eq!(config, HostConfig::default());
    }
}
