// ABOUTME: Host entries as written in a label's host list.
// ABOUTME: Parses formats like "host" and "host:port".

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub host: String,
    pub port: Option<u16>,
}

impl HostEntry {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("host cannot be empty".to_string());
        }

        let (host, port) = match s.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port in '{s}': {port_str}"))?;
                (host, Some(port))
            }
            None => (s, None),
        };

        if host.is_empty() {
            return Err(format!("hostname cannot be empty in '{s}'"));
        }

        Ok(HostEntry {
            host: host.to_string(),
            port,
        })
    }
}

impl<'de> Deserialize<'de> for HostEntry {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HostEntry::parse(&s).map_err(serde::de::Error::custom)
    }
}
