use serde::{Deserialize, Serialize};

pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

pub fn load_ice_servers_from_env() -> Vec<IceServerConfig> {
    load_ice_servers(|name| std::env::var(name).ok())
}

/// `ICE_SERVERS_JSON` wins; otherwise one STUN entry plus an optional TURN entry.
pub fn load_ice_servers(lookup: impl Fn(&str) -> Option<String>) -> Vec<IceServerConfig> {
    if let Some(raw_json) = lookup("ICE_SERVERS_JSON") {
        match serde_json::from_str::<Vec<IceServerConfig>>(&raw_json) {
            Ok(parsed) if !parsed.is_empty() => return parsed,
            Ok(_) => {}
            Err(err) => tracing::warn!(
                component = "ice",
                error = %err,
                "ICE_SERVERS_JSON unreadable, falling back to STUN/TURN vars"
            ),
        }
    }

    let csv = |name: &str| -> Vec<String> {
        lookup(name)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    };
    let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let mut stun_urls = csv("STUN_URLS");
    if stun_urls.is_empty() {
        stun_urls.push(DEFAULT_STUN_URL.to_string());
    }
    let mut servers = vec![IceServerConfig {
        urls: stun_urls,
        username: None,
        credential: None,
    }];

    let turn_urls = csv("TURN_URLS");
    if !turn_urls.is_empty() {
        servers.push(IceServerConfig {
            urls: turn_urls,
            username: non_blank("TURN_USERNAME"),
            credential: non_blank("TURN_PASSWORD").or_else(|| non_blank("TURN_CREDENTIAL")),
        });
    }

    servers
}
