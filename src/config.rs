//! Application configuration loaded from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct Features {
    pub daily_check: bool,
    pub status_report: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            daily_check: true,
            status_report: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub discord_token: String,
    pub db_url: String,
    pub db_path: String,
    pub logs_path: PathBuf,
    /// Local time of day the daily sale check starts.
    pub check_time: NaiveTime,
    pub check_timezone: Tz,
    /// How long to wait before retrying a listing after the store rate limited us.
    pub rate_limit_cooldown: Duration,
    pub fetch_timeout: Duration,
    pub source_requests_per_minute: u32,
    pub steam_country_code: String,
    pub steam_store_api_url: String,
    pub features: Features,
}

impl Config {
    pub fn new() -> Self {
        Self {
            discord_token: String::new(),
            db_url: "sqlite://data/data.db".to_string(),
            db_path: "data/data.db".to_string(),
            logs_path: PathBuf::from("logs"),
            check_time: NaiveTime::from_hms_opt(10, 5, 0).unwrap_or_default(),
            check_timezone: chrono_tz::America::Los_Angeles,
            rate_limit_cooldown: Duration::from_secs(5 * 60),
            fetch_timeout: Duration::from_secs(10),
            source_requests_per_minute: 40,
            steam_country_code: "US".to_string(),
            steam_store_api_url: "https://store.steampowered.com".to_string(),
            features: Features::default(),
        }
    }

    /// Overlays values from the process environment.
    pub fn load(&mut self) -> Result<(), AppError> {
        self.load_from(|key| std::env::var(key).ok())
    }

    /// Overlays values from `lookup`, leaving defaults for missing keys.
    pub fn load_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), AppError> {
        self.discord_token = lookup("DISCORD_TOKEN").ok_or_else(|| AppError::MissingConfig {
            key: "DISCORD_TOKEN".to_string(),
        })?;

        if let Some(v) = lookup("DB_URL") {
            self.db_url = v;
        }
        if let Some(v) = lookup("DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = lookup("LOGS_PATH") {
            self.logs_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CHECK_TIME") {
            self.check_time = NaiveTime::parse_from_str(&v, "%H:%M")
                .map_err(|e| AppError::invalid_config("CHECK_TIME", &v, e))?;
        }
        if let Some(v) = lookup("CHECK_TIMEZONE") {
            self.check_timezone =
                Tz::from_str(&v).map_err(|e| AppError::invalid_config("CHECK_TIMEZONE", &v, e))?;
        }
        if let Some(v) = lookup("RATE_LIMIT_COOLDOWN") {
            self.rate_limit_cooldown = Duration::from_secs(parse_num("RATE_LIMIT_COOLDOWN", &v)?);
        }
        if let Some(v) = lookup("FETCH_TIMEOUT") {
            self.fetch_timeout = Duration::from_secs(parse_num("FETCH_TIMEOUT", &v)?);
        }
        if let Some(v) = lookup("SOURCE_REQUESTS_PER_MINUTE") {
            let rate: u32 = parse_num("SOURCE_REQUESTS_PER_MINUTE", &v)?;
            if rate == 0 {
                return Err(AppError::invalid_config(
                    "SOURCE_REQUESTS_PER_MINUTE",
                    &v,
                    "must be greater than 0",
                ));
            }
            self.source_requests_per_minute = rate;
        }
        if let Some(v) = lookup("STEAM_COUNTRY_CODE") {
            self.steam_country_code = v;
        }
        if let Some(v) = lookup("STEAM_STORE_API_URL") {
            self.steam_store_api_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("FEATURE_DAILY_CHECK") {
            self.features.daily_check = parse_bool("FEATURE_DAILY_CHECK", &v)?;
        }
        if let Some(v) = lookup("FEATURE_STATUS_REPORT") {
            self.features.status_report = parse_bool("FEATURE_STATUS_REPORT", &v)?;
        }

        Ok(())
    }
}

fn parse_num<T>(key: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| AppError::invalid_config(key, value, e))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::invalid_config(key, value, "expected a boolean")),
    }
}
