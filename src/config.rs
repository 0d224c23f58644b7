//! Process configuration, resolved from the environment (optionally via a
//! `.env` file) with hard-coded fallbacks, following the same
//! `dotenvy` + `std::env::var` pattern the storage runtime config uses.

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub run_seeder: bool,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://checkpoint-engine.db".to_string()),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            run_seeder: std::env::var("RUN_SEEDER")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_when_env_is_empty() {
        // SAFETY: test-only; no other test in this process depends on these vars.
        unsafe {
            std::env::remove_var("DATABASE_URL");
            std::env::remove_var("BIND_ADDR");
            std::env::remove_var("RUN_SEEDER");
        }
        let config = EngineConfig::from_env();
        assert!(config.database_url.starts_with("sqlite://"));
        assert!(config.run_seeder);
    }
}
