use snafu::Snafu;

#[derive(Snafu, Debug)]
#[snafu(visibility = "pub")]
pub enum NamingError {
    /// Failed to construct the HTTP client.
    #[snafu(display("Failed to build HTTP client for naming server. Error={}", source))]
    Connect { source: reqwest::Error },

    /// No naming server configured.
    #[snafu(display("No naming server configured"))]
    NoServers {},

    /// Transport-level failure while talking to a naming server.
    #[snafu(display("Request to naming server {} failed. Error={}", url, source))]
    HttpRequest { url: String, source: reqwest::Error },

    /// Naming server answered with a non-success status.
    #[snafu(display(
        "Naming server {} responded with status {}: '{}'",
        url,
        status,
        body
    ))]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    /// Failed to decode naming server's response.
    #[snafu(display("Failed to decode response from {}. Error={}", url, source))]
    DecodeResponse {
        url: String,
        source: serde_json::Error,
    },

    /// Failed to serialize value to JSON.
    #[snafu(display("Failed to serialize value. Error={}", source))]
    SerializeValue { source: serde_json::Error },

    /// No instance matches the selection criteria.
    #[snafu(display("Instance list for service {} is empty", service))]
    EmptyInstanceList { service: String },

    /// Failed to persist service info on disk.
    #[snafu(display("Failed to write cache file '{}'. Error={}", path, source))]
    CacheWrite {
        path: String,
        source: std::io::Error,
    },
}

impl NamingError {
    /// Whether the request should be retried against another server.
    pub(crate) fn is_retriable(&self) -> bool {
        match self {
            NamingError::HttpRequest { .. } => true,
            NamingError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Beat acknowledged.
pub const BEAT_OK: i32 = 10200;
/// Instance behind the beat is unknown to the server and must be registered again.
pub const RESOURCE_NOT_FOUND: i32 = 20404;

pub const DEFAULT_BEAT_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_TIMEOUT_MS: u64 = 10000;
pub const DEFAULT_CACHE_MILLIS: u64 = 10000;
pub const DEFAULT_CONTEXT_PATH: &str = "/nacos";
pub const DEFAULT_SERVER_PORT: u16 = 8848;
