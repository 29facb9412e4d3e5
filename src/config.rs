use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9001;
pub const DEFAULT_NAME: &str = "Nadiem";
pub const LOG_ENV_VAR: &str = "GOPOINTS_LOG";

/// Reads the log level from `GOPOINTS_LOG`, unset or unparsable values fall
/// back to `INFO`.
pub fn log_level_from_env() -> tracing::Level {
    parse_log_level(std::env::var(LOG_ENV_VAR).ok().as_deref())
}

fn parse_log_level(value: Option<&str>) -> tracing::Level {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(tracing::Level::INFO)
}

pub fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {}", err);
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    addr: String,
    reflection: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: format!("0.0.0.0:{}", DEFAULT_PORT), reflection: true }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addr<S: Into<String>>(mut self, addr: S) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_reflection(mut self, reflection: bool) -> Self {
        self.reflection = reflection;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn reflection(&self) -> bool {
        self.reflection
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    addr: String,
    name: String,
    deadline: Duration,
    connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: format!("localhost:{}", DEFAULT_PORT),
            name: DEFAULT_NAME.to_string(),
            deadline: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the default configuration, taking the name from the first
    /// positional argument when there is one. Extra arguments are ignored.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        match args.into_iter().next() {
            Some(name) => Self::default().with_name(name),
            None => Self::default(),
        }
    }

    pub fn with_addr<S: Into<String>>(mut self, addr: S) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}
