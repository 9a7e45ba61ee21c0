use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub default_processor_url: String,
    pub fallback_processor_url: String,
    pub redis_url: String,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout_secs: u64,
    pub health_check_window_ms: u64,
    pub health_check_timeout_ms: u64,
    pub payment_timeout_ms: u64,
    pub dispatch_deadline_ms: u64,
    pub coordination_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 9999,
            default_processor_url: "http://payment-processor-default:8080".to_string(),
            fallback_processor_url: "http://payment-processor-fallback:8080".to_string(),
            redis_url: "redis://redis:6379".to_string(),
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_secs: 30,
            health_check_window_ms: 5000,
            health_check_timeout_ms: 1000,
            payment_timeout_ms: 3000,
            dispatch_deadline_ms: 8000,
            coordination_timeout_ms: 200,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("PORT", defaults.server_port),
            default_processor_url: env::var("DEFAULT_PROCESSOR_URL")
                .unwrap_or(defaults.default_processor_url),
            fallback_processor_url: env::var("FALLBACK_PROCESSOR_URL")
                .unwrap_or(defaults.fallback_processor_url),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            circuit_breaker_threshold: env_or(
                "CIRCUIT_BREAKER_THRESHOLD",
                defaults.circuit_breaker_threshold,
            ),
            circuit_breaker_timeout_secs: env_or(
                "CIRCUIT_BREAKER_TIMEOUT",
                defaults.circuit_breaker_timeout_secs,
            ),
            health_check_window_ms: env_or("HEALTH_CHECK_WINDOW_MS", defaults.health_check_window_ms),
            health_check_timeout_ms: env_or(
                "HEALTH_CHECK_TIMEOUT_MS",
                defaults.health_check_timeout_ms,
            ),
            payment_timeout_ms: env_or("PAYMENT_TIMEOUT_MS", defaults.payment_timeout_ms),
            dispatch_deadline_ms: env_or("DISPATCH_DEADLINE_MS", defaults.dispatch_deadline_ms),
            coordination_timeout_ms: env_or(
                "COORDINATION_TIMEOUT_MS",
                defaults.coordination_timeout_ms,
            ),
        }
    }

    pub fn circuit_breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_timeout_secs)
    }

    pub fn health_check_window(&self) -> Duration {
        Duration::from_millis(self.health_check_window_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_millis(self.payment_timeout_ms)
    }

    pub fn dispatch_deadline(&self) -> Duration {
        Duration::from_millis(self.dispatch_deadline_ms)
    }

    pub fn coordination_timeout(&self) -> Duration {
        Duration::from_millis(self.coordination_timeout_ms)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
