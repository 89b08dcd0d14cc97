use std::env;

const DEV_JWT_SECRET: &str = "dev-only-insecure-default-key-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Postgres booking store when set, in-memory store otherwise.
    pub database_url: Option<String>,
    pub cors_origins: Vec<String>,
    /// Offset in which booking dates and slot labels are written.
    pub schedule_utc_offset_minutes: i32,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let port = lookup("SESSION_SERVER_PORT")
            .unwrap_or_else(|| "5000".into())
            .parse::<u16>()
            .map_err(|e| format!("invalid SESSION_SERVER_PORT: {e}"))?;

        let schedule_utc_offset_minutes = lookup("SCHEDULE_UTC_OFFSET_MINUTES")
            .unwrap_or_else(|| "0".into())
            .parse::<i32>()
            .map_err(|e| format!("invalid SCHEDULE_UTC_OFFSET_MINUTES: {e}"))?;
        if schedule_utc_offset_minutes.abs() >= 24 * 60 {
            return Err(format!(
                "invalid SCHEDULE_UTC_OFFSET_MINUTES: {schedule_utc_offset_minutes} is out of range"
            ));
        }

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!(
                    component = "config",
                    "JWT_SECRET not set, using insecure development default"
                );
                DEV_JWT_SECRET.to_string()
            }
        };

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".into())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            host: lookup("SESSION_SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            jwt_secret,
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            cors_origins,
            schedule_utc_offset_minutes,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
