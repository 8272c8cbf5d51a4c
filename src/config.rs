use std::time::Duration;

// Timeout and reconnect defaults
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONNECT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Protocol role of a session.
///
/// The role decides whether a failed transmit may trigger automatic
/// failover: subscriber sessions drive their own recovery from the poll
/// loop and must see the raw connection failure instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Plain query/response traffic.
    Query,
    /// Prepared-statement traffic (binary frames).
    Statement,
    /// Subscription/consumer traffic; reconnection is managed externally.
    Subscriber,
}

impl SessionRole {
    /// Whether a transmit failure on this session may be retried through the
    /// failover engine.
    pub fn allows_auto_retry(&self) -> bool {
        !matches!(self, SessionRole::Subscriber)
    }
}

/// Configuration for one transport session: credentials for the handshake
/// replay, timeout bounds, and the reconnect policy.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user: String,
    pub password: String,
    pub database: Option<String>,
    /// Connect-mode selector forwarded in the handshake; omitted when `None`.
    pub connect_mode: Option<i64>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub auto_reconnect: bool,
    pub reconnect_retry_count: u32,
    pub reconnect_interval: Duration,
    /// Upper bound on concurrently pending requests; `None` means unbounded.
    pub max_in_flight: Option<usize>,
    pub role: SessionRole,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            database: None,
            connect_mode: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            auto_reconnect: true,
            reconnect_retry_count: DEFAULT_RECONNECT_RETRY_COUNT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_in_flight: None,
            role: SessionRole::Query,
        }
    }
}

impl SessionConfig {
    /// Create a config with credentials and defaults for everything else.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_connect_mode(mut self, mode: i64) -> Self {
        self.connect_mode = Some(mode);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_policy(mut self, retry_count: u32, interval: Duration) -> Self {
        self.reconnect_retry_count = retry_count;
        self.reconnect_interval = interval;
        self
    }

    pub fn with_max_in_flight(mut self, bound: usize) -> Self {
        self.max_in_flight = Some(bound);
        self
    }

    pub fn with_role(mut self, role: SessionRole) -> Self {
        self.role = role;
        self
    }
}
