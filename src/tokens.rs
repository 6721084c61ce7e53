use chrono::{DateTime, Local};
use std::fmt::Write;

/// Expands the placeholder tokens accepted in output paths and filename patterns.
///
/// | Token | Replacement |
/// |-------|-------------|
/// | `[time]` | Unix time in whole seconds |
/// | `[time(FMT)]` | Local time formatted with strftime `FMT` |
/// | `[hostname]` | OS host name, `null` if unknown |
/// | `[user]` | Login name, `null` if unknown |
/// | `%date%` | Local date as `YYYY-MM-DD` |
///
/// `%counter%` is left alone; the filename resolver owns it.
#[derive(Debug, Clone)]
pub struct TextTokens {
    hostname: String,
    user: String,
}

impl Default for TextTokens {
    fn default() -> Self {
        Self::new()
    }
}

impl TextTokens {
    /// Capture host and user names from the environment.
    pub fn new() -> Self {
        Self {
            hostname: detect_hostname().unwrap_or_else(|| "null".to_string()),
            user: detect_user().unwrap_or_else(|| "null".to_string()),
        }
    }

    /// Use fixed host and user names.
    pub fn with_identity(hostname: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            user: user.into(),
        }
    }

    /// Expand every token using the current local time.
    pub fn expand(&self, text: &str) -> String {
        self.expand_at(text, Local::now())
    }

    /// Expand every token as of `now`.
    pub fn expand_at(&self, text: &str, now: DateTime<Local>) -> String {
        let out = text
            .replace("[time]", &now.timestamp().to_string())
            .replace("[hostname]", &self.hostname)
            .replace("[user]", &self.user)
            .replace("%date%", &now.format("%Y-%m-%d").to_string());
        expand_custom_time(&out, now)
    }
}

/// Replace each `[time(FMT)]` with `now` formatted by `FMT`.
fn expand_custom_time(text: &str, now: DateTime<Local>) -> String {
    const OPEN: &str = "[time(";
    const CLOSE: &str = ")]";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);
        let fmt = &after_open[..end];
        let mut formatted = String::new();
        if write!(formatted, "{}", now.format(fmt)).is_ok() {
            out.push_str(&formatted);
        } else {
            log::warn!("Invalid time format `{fmt}`, leaving token unexpanded");
            out.push_str(&rest[start..start + OPEN.len() + end + CLOSE.len()]);
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

fn detect_hostname() -> Option<String> {
    let os_name = gethostname::gethostname().to_string_lossy().into_owned();
    Some(os_name)
        .filter(|name| !name.trim().is_empty())
        .or_else(|| {
            ["HOSTNAME", "COMPUTERNAME"]
                .iter()
                .find_map(|key| std::env::var(key).ok())
        })
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn detect_user() -> Option<String> {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok())
        .filter(|name| !name.is_empty())
}
