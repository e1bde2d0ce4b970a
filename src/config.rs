use std::env;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// How the refresh token travels between server and client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTransport {
    /// httpOnly cookie named `refreshToken`.
    Cookie,
    /// `refreshToken` field in the JSON body.
    Body,
}

impl FromStr for RefreshTransport {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cookie" => Ok(RefreshTransport::Cookie),
            "body" | "header" => Ok(RefreshTransport::Body),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub server_port: u16,
    pub server_host: String,
    pub jwt: JwtConfig,
    pub bcrypt_cost: u32,
    pub reset_token_ttl_minutes: i64,
    pub verification_token_ttl_minutes: i64,
    pub frontend_url: String,
    pub cors_origins: Vec<String>,
    pub expose_reset_token: bool,
    pub send_verification_email: bool,
    pub refresh_transport: RefreshTransport,
    pub cookie_secure: bool,
    pub oauth_success_redirect: bool,
    pub mail: MailConfig,
    pub google: Option<OAuthClientConfig>,
    pub github: Option<OAuthClientConfig>,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Longest lifetime accepted for any token: ten years.
const MAX_TTL_MINUTES: i64 = 60 * 24 * 365 * 10;

/// A lifetime in minutes. Zero, negative and out-of-range values are rejected
/// so that expiry arithmetic cannot overflow.
fn ttl_minutes(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    let minutes = parsed(name, default)?;
    if (1..=MAX_TTL_MINUTES).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(ConfigError::Invalid {
            name,
            value: format!("{} (expected 1 to {} minutes)", minutes, MAX_TTL_MINUTES),
        })
    }
}

fn oauth_client(prefix: &str, default_redirect: String) -> Option<OAuthClientConfig> {
    let client_id = optional(&format!("{}_CLIENT_ID", prefix))?;
    let client_secret = optional(&format!("{}_CLIENT_SECRET", prefix))?;
    let redirect_uri = optional(&format!("{}_REDIRECT_URI", prefix)).unwrap_or(default_redirect);
    Some(OAuthClientConfig {
        client_id,
        client_secret,
        redirect_uri,
    })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_port = parsed("SERVER_PORT", 8080u16)?;
        let server_host = optional("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let access_secret = required("JWT_SECRET")?;
        let refresh_secret = required("JWT_REFRESH_SECRET")?;
        if access_secret == refresh_secret {
            return Err(ConfigError::Invalid {
                name: "JWT_REFRESH_SECRET",
                value: "must differ from JWT_SECRET".into(),
            });
        }

        let frontend_url = optional("FRONTEND_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();
        let cors_origins = optional("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec![frontend_url.clone()]);

        let refresh_transport = match optional("REFRESH_TOKEN_TRANSPORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "REFRESH_TOKEN_TRANSPORT",
                value,
            })?,
            None => RefreshTransport::Cookie,
        };

        let server_url = format!("http://{}:{}", server_host, server_port);

        Ok(Self {
            database_url: optional("DATABASE_URL"),
            jwt: JwtConfig {
                access_secret,
                refresh_secret,
                access_ttl_minutes: ttl_minutes("JWT_ACCESS_TTL_MINUTES", 60 * 24)?,
                refresh_ttl_minutes: ttl_minutes("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 7)?,
            },
            bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            reset_token_ttl_minutes: ttl_minutes("RESET_TOKEN_TTL_MINUTES", 10)?,
            verification_token_ttl_minutes: ttl_minutes("VERIFICATION_TOKEN_TTL_MINUTES", 60 * 24)?,
            cors_origins,
            expose_reset_token: parsed("EXPOSE_RESET_TOKEN", false)?,
            send_verification_email: parsed("SEND_VERIFICATION_EMAIL", true)?,
            refresh_transport,
            cookie_secure: parsed("COOKIE_SECURE", false)?,
            oauth_success_redirect: parsed("OAUTH_SUCCESS_REDIRECT", true)?,
            mail: MailConfig {
                api_url: optional("MAIL_API_URL"),
                api_key: optional("MAIL_API_KEY"),
                from: optional("MAIL_FROM")
                    .unwrap_or_else(|| "Task Master <noreply@taskmaster.local>".to_string()),
            },
            google: oauth_client(
                "GOOGLE",
                format!("{}/api/auth/google/callback", server_url),
            ),
            github: oauth_client(
                "GITHUB",
                format!("{}/api/auth/github/callback", server_url),
            ),
            frontend_url,
            server_port,
            server_host,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}
