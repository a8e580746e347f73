use std::env;
use std::fmt;

use crate::core::Device;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 34100;

/// Process configuration resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub default_generator: String,
    pub chat_generator: Option<String>,
    pub device: Device,
    pub host: Host,
}

impl Settings {
    /// Names that should be loaded before the server accepts traffic.
    pub fn warm_models(&self) -> Vec<&str> {
        let mut names = vec![self.default_generator.as_str()];
        if let Some(chat) = self.chat_generator.as_deref() {
            if chat != self.default_generator {
                names.push(chat);
            }
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub host: String,
    pub port: u16,
}

impl Host {
    /// Reads `MAI_HOST` (optionally `host:port`) and `MAI_PORT`.
    pub fn from_env() -> Self {
        let mut host = env::var("MAI_HOST")
            .map(|h| Self::parse(&h))
            .unwrap_or_default();

        if let Some(port) = env::var("MAI_PORT").ok().and_then(|p| p.parse().ok()) {
            host.port = port;
        }
        host
    }

    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            return Self::default();
        }

        match value.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.ends_with(':') => Self {
                host: host.to_string(),
                port: port.parse().unwrap_or(DEFAULT_PORT),
            },
            _ => Self {
                host: value.to_string(),
                port: DEFAULT_PORT,
            },
        }
    }
}

impl Default for Host {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_parse() {
        assert_eq!(Host::parse(""), Host::default());
        assert_eq!(
            Host::parse("127.0.0.1:8080"),
            Host {
                host: "127.0.0.1".into(),
                port: 8080
            }
        );
        assert_eq!(Host::parse("localhost").port, DEFAULT_PORT);
        assert_eq!(Host::parse("localhost:nope").port, DEFAULT_PORT);
        assert_eq!(Host::default().to_string(), "0.0.0.0:34100");
    }

    #[test]
    fn test_warm_models() {
        let mut settings = Settings {
            default_generator: "codellama".into(),
            chat_generator: None,
            device: Device::Cpu,
            host: Host::default(),
        };
        assert_eq!(settings.warm_models(), ["codellama"]);

        settings.chat_generator = Some("qwen".into());
        assert_eq!(settings.warm_models(), ["codellama", "qwen"]);

        settings.chat_generator = Some("codellama".into());
        assert_eq!(settings.warm_models(), ["codellama"]);
    }
}
