use anyhow::Context;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from: String,
    /// Username and password, only used when both are set.
    pub credentials: Option<(String, String)>,
    pub use_tls: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Mounts `/users/send-code` and `/users/login-email`.
    pub email_login: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub smtp: Option<SmtpConfig>,
    /// Basic auth user and password guarding the Swagger UI. Off when no user is set.
    pub swagger_auth: Option<(String, String)>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let smtp = match var("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(var("SMTP_PORT"), "SMTP_PORT", 587)?,
                from: var("SMTP_FROM").unwrap_or_else(|| "noreply@localhost".into()),
                credentials: var("SMTP_USERNAME").zip(var("SMTP_PASSWORD")),
                use_tls: parse_bool_or(var("SMTP_TLS"), "SMTP_TLS", true)?,
            }),
            None => None,
        };

        Ok(Self {
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(var("APP_PORT"), "APP_PORT", 8080)?,
            email_login: parse_bool_or(var("APP_EMAIL_LOGIN"), "APP_EMAIL_LOGIN", true)?,
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_or(
                var("DATABASE_MAX_CONNECTIONS"),
                "DATABASE_MAX_CONNECTIONS",
                10,
            )?,
            redis_url: var("REDIS_URL"),
            smtp,
            swagger_auth: var("SWAGGER_USER")
                .map(|user| (user, var("SWAGGER_PASSWORD").unwrap_or_default())),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, v)),
        None => Ok(default),
    }
}

fn parse_bool_or(value: Option<String>, key: &str, default: bool) -> anyhow::Result<bool> {
    match value.as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => anyhow::bail!("{} has an invalid value '{}'", key, other),
    }
}
