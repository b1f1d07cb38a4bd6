use std::{collections::HashMap, env, fs, path::Path, time::Duration};

use crate::{errors::Error, services::users::Role, Result};

/// Typed configuration for the bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Messenger
    pub telegram_bot_token: String,

    // Session store
    pub redis_url: Option<String>,
    pub state_key_prefix: String,
    pub state_ttl: Duration,

    // Logging
    pub log_level: String,

    // Registration
    pub verification_code: String,
    pub role_markers: HashMap<String, Role>,

    // Background work
    pub reminder_scan_interval: Duration,
    pub event_queue_capacity: usize,

    // Moodle
    pub moodle_base_url: Option<String>,
}

pub const DEFAULT_STATE_KEY_PREFIX: &str = "unibot:user:";
pub const DEFAULT_VERIFICATION_CODE: &str = "1111";
const DEFAULT_ROLE_MARKERS: &str = "Administrator=manager,Teacher=employee,Applicant=applicant";

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = lookup("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let redis_url = lookup("REDIS_URL").and_then(non_empty);
        let state_key_prefix = lookup("STATE_KEY_PREFIX")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_STATE_KEY_PREFIX.to_string());
        let state_ttl = Duration::from_secs(
            parse_u64(lookup("STATE_TTL_HOURS")).unwrap_or(48).max(1) * 3600,
        );

        let log_level = lookup("LOG_LEVEL")
            .and_then(non_empty)
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "info".to_string());

        let verification_code = lookup("EMAIL_VERIFICATION_CODE")
            .and_then(non_empty)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_VERIFICATION_CODE.to_string());
        let role_markers = parse_role_markers(
            &lookup("REGISTRATION_ROLE_MARKERS").unwrap_or_else(|| DEFAULT_ROLE_MARKERS.to_string()),
        );

        let reminder_scan_interval = Duration::from_secs(
            parse_u64(lookup("REMINDER_SCAN_INTERVAL_SECS"))
                .unwrap_or(60)
                .max(1),
        );
        let event_queue_capacity = parse_u64(lookup("EVENT_QUEUE_CAPACITY"))
            .map(|v| v as usize)
            .unwrap_or(1024)
            .max(1);

        let moodle_base_url = lookup("MOODLE_BASE_URL")
            .and_then(non_empty)
            .map(|s| s.trim().trim_end_matches('/').to_string());

        Ok(Self {
            telegram_bot_token,
            redis_url,
            state_key_prefix,
            state_ttl,
            log_level,
            verification_code,
            role_markers,
            reminder_scan_interval,
            event_queue_capacity,
            moodle_base_url,
        })
    }
}

/// Parse `Name=role,Name=role`. Unknown roles and malformed pairs are skipped.
fn parse_role_markers(raw: &str) -> HashMap<String, Role> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .filter_map(|(name, role)| {
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            role.trim().parse::<Role>().ok().map(|r| (name.to_string(), r))
        })
        .collect()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn defaults_apply() {
        let cfg = Config::from_lookup(lookup_from(&[("TELEGRAM_BOT_TOKEN", "t")])).unwrap();
        assert_eq!(cfg.redis_url, None);
        assert_eq!(cfg.state_key_prefix, DEFAULT_STATE_KEY_PREFIX);
        assert_eq!(cfg.state_ttl, Duration::from_secs(48 * 3600));
        assert_eq!(cfg.verification_code, "1111");
        assert_eq!(cfg.reminder_scan_interval, Duration::from_secs(60));
        assert_eq!(cfg.role_markers.get("Administrator"), Some(&Role::Manager));
        assert_eq!(cfg.role_markers.get("Teacher"), Some(&Role::Employee));
        assert_eq!(cfg.role_markers.get("Applicant"), Some(&Role::Applicant));
    }

    #[test]
    fn malformed_numbers_fall_back() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("STATE_TTL_HOURS", "soon"),
            ("REMINDER_SCAN_INTERVAL_SECS", "-5"),
        ]))
        .unwrap();
        assert_eq!(cfg.state_ttl, Duration::from_secs(48 * 3600));
        assert_eq!(cfg.reminder_scan_interval, Duration::from_secs(60));
    }

    #[test]
    fn role_markers_skip_garbage() {
        let markers = parse_role_markers("Boss=manager, =student,Nobody,Kid=wizard");
        assert_eq!(markers.len(), 1);
        assert_eq!(markers.get("Boss"), Some(&Role::Manager));
    }

    #[test]
    fn moodle_url_is_trimmed() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("MOODLE_BASE_URL", "http://moodle.local/ "),
        ]))
        .unwrap();
        assert_eq!(cfg.moodle_base_url.as_deref(), Some("http://moodle.local"));
    }
}
