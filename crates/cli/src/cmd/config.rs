use std::path::Path;

use anyhow::Context;

use realtime::config::default_config_path;
use realtime::{ClientConfig, VoiceFeatures};

const REDACTED: &str = "<redacted>";

pub fn show_config(cfg: &ClientConfig, path: Option<&Path>) -> anyhow::Result<()> {
    match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) if p.exists() => println!("# file: {}", p.display()),
        Some(p) => println!("# file: {} (not found, using defaults)", p.display()),
        None => println!("# file: none"),
    }
    match cfg.voice_features() {
        VoiceFeatures::Enabled { agent_id } => println!("# voice: enabled (agent {agent_id})"),
        VoiceFeatures::Disabled { missing } => println!("# voice: disabled (missing {})", missing.join(", ")),
    }
    let stream = cfg.stream_url().context("building stream url")?;
    println!("# stream: {stream}");
    println!();
    print!("{}", render_redacted(cfg)?);
    Ok(())
}

fn render_redacted(cfg: &ClientConfig) -> anyhow::Result<String> {
    let mut shown = cfg.clone();
    if shown.voice.api_key.is_some() {
        shown.voice.api_key = Some(REDACTED.to_string());
    }
    toml::to_string_pretty(&shown).context("serializing configuration")
}
