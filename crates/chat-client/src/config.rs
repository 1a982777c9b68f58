use std::time::Duration;

use chat_core::{ChatError, ChatErrorCategory, RetryPolicy};
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_LOGOUT_GRACE: Duration = Duration::from_millis(100);
const DEFAULT_COMMAND_BUFFER: usize = 128;
const DEFAULT_EVENT_BUFFER: usize = 512;
const SOCKET_PATH: &str = "/socket.io/";

#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub server_url: Url,
    pub retry: RetryPolicy,
    /// Bound on one connect attempt including the handshake.
    pub connect_timeout: Duration,
    /// Delay between emitting `logout` and closing the channel.
    pub logout_grace: Duration,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl ChatClientConfig {
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            retry: RetryPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            logout_grace: DEFAULT_LOGOUT_GRACE,
            command_buffer: DEFAULT_COMMAND_BUFFER,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    pub fn parse(server_url: &str) -> Result<Self, ChatError> {
        let url = Url::parse(server_url.trim()).map_err(|err| {
            ChatError::new(
                ChatErrorCategory::Config,
                "invalid_server_url",
                format!("invalid server url '{server_url}': {err}"),
            )
        })?;
        let config = Self::new(url);
        config.socket_endpoint()?;
        Ok(config)
    }

    /// Engine.IO websocket endpoint for the configured server.
    pub fn socket_endpoint(&self) -> Result<Url, ChatError> {
        let scheme = match self.server_url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ChatError::new(
                    ChatErrorCategory::Config,
                    "unsupported_scheme",
                    format!("unsupported server url scheme '{other}'"),
                ));
            }
        };

        let mut endpoint = self.server_url.clone();
        endpoint.set_scheme(scheme).map_err(|()| {
            ChatError::new(
                ChatErrorCategory::Config,
                "unsupported_scheme",
                format!("cannot use scheme '{scheme}' for {}", self.server_url),
            )
        })?;
        endpoint.set_path(SOCKET_PATH);
        endpoint.set_fragment(None);
        endpoint.set_query(Some("EIO=4&transport=websocket"));
        Ok(endpoint)
    }

    /// Storage namespace so that two servers never share local state.
    pub fn storage_scope(&self) -> String {
        let host = self.server_url.host_str().unwrap_or("local");
        match self.server_url.port_or_known_default() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_http_to_engine_io_endpoint() {
        let config = ChatClientConfig::parse("http://localhost:3000").expect("valid url");
        assert_eq!(
            config
                .socket_endpoint()
                .expect("endpoint should build")
                .as_str(),
            "ws://localhost:3000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn maps_https_and_drops_path() {
        let config =
            ChatClientConfig::parse("https://chat.example.org/app?x=1#top").expect("valid url");
        assert_eq!(
            config
                .socket_endpoint()
                .expect("endpoint should build")
                .as_str(),
            "wss://chat.example.org/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn rejects_other_schemes() {
        let err = ChatClientConfig::parse("ftp://files.example.org").expect_err("ftp rejected");
        assert_eq!(err.category, ChatErrorCategory::Config);
        assert_eq!(err.code, "unsupported_scheme");

        let err = ChatClientConfig::parse("not a url").expect_err("garbage rejected");
        assert_eq!(err.code, "invalid_server_url");
    }

    #[test]
    fn defaults_follow_reconnect_policy() {
        let config = ChatClientConfig::parse(DEFAULT_SERVER_URL).expect("default url parses");
        assert_eq!(config.retry.base_delay_ms(), 1_000);
        assert_eq!(config.retry.max_delay_ms(), 5_000);
        assert_eq!(config.retry.max_attempts(), 5);
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.logout_grace, Duration::from_millis(100));
        assert_eq!(config.storage_scope(), "localhost:3000");
    }
}
