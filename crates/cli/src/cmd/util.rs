use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;

use common::{parse_timestamp, EventPayload, StreamEvent};
use realtime::ClientConfig;

/// Global flags that override the config file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigArgs {
    pub api_url: Option<String>,
    pub user: Option<String>,
    pub config: Option<PathBuf>,
}

/// File, then environment, then flags. Validated before returning.
pub fn load_config(args: &ConfigArgs) -> anyhow::Result<ClientConfig> {
    let mut cfg = ClientConfig::load(args.config.as_deref()).context("loading configuration")?;
    apply_flags(&mut cfg, args);
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn apply_flags(cfg: &mut ClientConfig, args: &ConfigArgs) {
    if let Some(url) = &args.api_url {
        cfg.api_url = url.clone();
    }
    if let Some(user) = &args.user {
        cfg.user_id = user.clone();
    }
}

/// Directory used for local state such as the dashboard log.
pub fn data_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::data_dir().context("data dir")?.join("gatekeeper"))
}

pub fn log_file_path() -> anyhow::Result<PathBuf> {
    Ok(data_dir()?.join("dashboard.log"))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `1m 05s`, `42s`, `-` for calls still in progress.
pub fn format_duration(secs: u64) -> String {
    match secs {
        0 => "-".to_string(),
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m {:02}s", s / 60, s % 60),
        s => format!("{}h {:02}m", s / 3600, (s % 3600) / 60),
    }
}

/// Render a backend timestamp in local time; unparseable input is shown as-is.
pub fn local_time(ts: &str, fmt: &str) -> String {
    match parse_timestamp(ts) {
        Some(dt) => dt.with_timezone(&chrono::Local).format(fmt).to_string(),
        None if ts.is_empty() => "-".to_string(),
        None => ts.to_string(),
    }
}

pub fn percent(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

/// One-line human summary of a stream event.
pub fn describe_event(ev: &StreamEvent) -> String {
    let kind = ev.kind();
    match &ev.payload {
        EventPayload::CallCreated(p) => format!("{kind} {} from {}", p.call_id, p.caller_number),
        EventPayload::CallUpdated(p) => {
            let target = p.call_id.as_deref().or(p.caller_number.as_deref()).unwrap_or("?");
            match p.updates.status {
                Some(status) => format!("{kind} {target} -> {status}"),
                None => format!("{kind} {target}"),
            }
        }
        EventPayload::ScamBlocked(p) => {
            format!("{kind} {} {} ({})", p.call_sid, p.scam_type, percent(p.confidence))
        }
        EventPayload::ToolExecuted(p) => format!("{kind} {}", p.tool),
        EventPayload::AnalyticsUpdated(p) => {
            let fields = serde_json::to_value(p)
                .ok()
                .and_then(|v| v.as_object().map(|o| o.keys().cloned().collect::<Vec<_>>()))
                .unwrap_or_default();
            format!("{kind} [{}]", fields.join(", "))
        }
        EventPayload::AiThinking(p) => format!("{kind} {}: {}", p.agent, p.thought),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{decode_event, CallStatus};

    #[test]
    fn flags_override_loaded_values() {
        let mut cfg = ClientConfig::default();
        let args = ConfigArgs {
            api_url: Some("https://api.example.com".into()),
            user: Some("alice".into()),
            config: None,
        };
        apply_flags(&mut cfg, &args);
        assert_eq!(cfg.api_url, "https://api.example.com");
        assert_eq!(cfg.user_id, "alice");

        let mut untouched = ClientConfig::default();
        apply_flags(&mut untouched, &ConfigArgs::default());
        assert_eq!(untouched, ClientConfig::default());
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(0), "-");
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(65), "1m 05s");
        assert_eq!(format_duration(3720), "1h 02m");
    }

    #[test]
    fn unparseable_time_is_shown_raw() {
        assert_eq!(local_time("", "%H:%M"), "-");
        assert_eq!(local_time("yesterday", "%H:%M"), "yesterday");
        assert_eq!(local_time("2025-01-01T10:00:00", "%Y").len(), 4);
    }

    #[test]
    fn describes_events() {
        let blocked = decode_event(
            Some("scam_blocked"),
            r#"{"type":"scam_blocked","data":{"call_sid":"c1","confidence":0.95,"scam_type":"IRS"}}"#,
        )
        .unwrap();
        assert_eq!(describe_event(&blocked), "scam_blocked c1 IRS (95%)");

        let updated = decode_event(
            None,
            r#"{"type":"call_updated","data":{"call_id":"c2","updates":{"status":"passed"}}}"#,
        )
        .unwrap();
        assert_eq!(describe_event(&updated), format!("call_updated c2 -> {}", CallStatus::Passed));
    }
}
