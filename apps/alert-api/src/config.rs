/// Alert API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC secret used to sign and verify access tokens.
    pub jwt_secret: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Lifetime of issued access tokens.
    pub access_token_expire_minutes: i64,
    /// A live connection that sends nothing for this long is closed.
    pub ws_idle_timeout_secs: u64,
    /// Outbound frames buffered per connection before it is considered dead.
    pub ws_queue_capacity: usize,
    /// Password for the `admin` super admin seeded at startup.
    pub admin_password: String,
    /// Allowed CORS origins. `None` allows any origin.
    pub cors_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            port: parsed_var("PORT", 4000),
            access_token_expire_minutes: parsed_var("ACCESS_TOKEN_EXPIRE_MINUTES", 1440),
            ws_idle_timeout_secs: parsed_var("WS_IDLE_TIMEOUT_SECS", 120),
            ws_queue_capacity: parsed_var::<usize>("WS_QUEUE_CAPACITY", 256).max(1),
            admin_password: required_var("ADMIN_PASSWORD"),
            cors_origins: std::env::var("CORS_ORIGINS")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                }),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
