use std::net::IpAddr;

use ipnet::IpNet;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub trusted_proxies: Vec<IpNet>,
    pub log_level: String,
    /// What happens to the triggering request when an audit append fails.
    pub on_audit_failure: AuditFailurePolicy,
    /// Upper bound on waiting for a workspace chain's serialization lock.
    pub audit_lock_timeout_ms: u64,
}

/// Policy for audit append failures. `FailClosed` fails the business
/// operation alongside the append; `FailOpenAndAlert` lets it proceed and
/// raises a structured error-level event for operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuditFailurePolicy {
    FailClosed,
    FailOpenAndAlert,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt_secret = env_required("JWT_SECRET")?;

        let host: IpAddr = env_or("STRIDE_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid STRIDE_HOST: {e}"))?;

        let port: u16 = env_or("STRIDE_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid STRIDE_PORT: {e}"))?;

        let trusted_proxies: Vec<IpNet> = env_or("STRIDE_TRUSTED_PROXIES", "")
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse()
                    .map_err(|e| format!("Invalid STRIDE_TRUSTED_PROXIES entry '{s}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let log_level = env_or("STRIDE_LOG_LEVEL", "info");

        let on_audit_failure = match env_or("STRIDE_ON_AUDIT_FAILURE", "fail_closed").as_str() {
            "fail_closed" => AuditFailurePolicy::FailClosed,
            "fail_open_and_alert" => AuditFailurePolicy::FailOpenAndAlert,
            other => return Err(format!("Invalid STRIDE_ON_AUDIT_FAILURE: {other}")),
        };

        let audit_lock_timeout_ms: u64 = env_or("STRIDE_AUDIT_LOCK_TIMEOUT_MS", "5000")
            .parse()
            .map_err(|e| format!("Invalid STRIDE_AUDIT_LOCK_TIMEOUT_MS: {e}"))?;

        Ok(Config {
            database_url,
            jwt_secret,
            host,
            port,
            trusted_proxies,
            log_level,
            on_audit_failure,
            audit_lock_timeout_ms,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
