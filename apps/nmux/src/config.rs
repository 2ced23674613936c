use std::path::PathBuf;

use url::Url;

pub const DEFAULT_SERVER: &str = "127.0.0.1:9939";
pub const DEFAULT_PATH: &str = "/nmux";

/// Client configuration, built from the command line (see [`crate::cli`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `host:port` of the nmux server.
    pub server: String,
    /// Websocket endpoint path on the server.
    pub path: String,
    /// Hexdump every inbound message at trace level.
    pub debug: bool,
    /// JSON-lines recording of the session, if any.
    pub record: Option<PathBuf>,
}

impl Config {
    pub fn with_server(mut self, server: Option<String>) -> Self {
        if let Some(server) = server {
            self.server = normalize_server(&server);
        }
        self
    }

    pub fn socket_url(&self) -> Result<Url, url::ParseError> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Url::parse(&format!("ws://{}{}", self.server, path))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            path: DEFAULT_PATH.to_string(),
            debug: false,
            record: None,
        }
    }
}

// Prefer IPv4 so a host listening on 127.0.0.1 is reached even where
// "localhost" resolves to ::1 first.
fn normalize_server(server: &str) -> String {
    let server = server.trim();
    let server = server
        .strip_prefix("ws://")
        .unwrap_or(server)
        .trim_end_matches('/');
    if server == "localhost" {
        "127.0.0.1".to_string()
    } else if let Some(port) = server.strip_prefix("localhost:") {
        format!("127.0.0.1:{port}")
    } else {
        server.to_string()
    }
}
