use std::path::PathBuf;

use anyhow::{bail, Context};

use common::CallLogRequest;
use realtime::{ApiClient, ClientConfig, VoiceFeatures};

#[derive(Debug, Clone)]
pub struct LogCallArgs {
    pub caller: String,
    pub transcript: Option<String>,
    pub transcript_file: Option<PathBuf>,
    pub score: f64,
    pub intent: String,
}

pub async fn log_call(cfg: &ClientConfig, args: LogCallArgs) -> anyhow::Result<()> {
    if let VoiceFeatures::Disabled { missing } = cfg.voice_features() {
        bail!("voice features are disabled (missing voice.{}); set them in the config file or environment", missing.join(", voice."));
    }
    let req = build_request(cfg, args).await?;
    let api = ApiClient::from_config(cfg)?;
    let resp = api.log_call(&req).await.context("logging call")?;
    if !resp.success {
        bail!("backend rejected call log: {}", resp.message);
    }
    println!("logged call {}", resp.call_id);
    if let Some(summary) = resp.summary {
        println!("summary: {summary}");
    }
    Ok(())
}

async fn build_request(cfg: &ClientConfig, args: LogCallArgs) -> anyhow::Result<CallLogRequest> {
    if !(0.0..=1.0).contains(&args.score) {
        bail!("score must be within [0, 1], got {}", args.score);
    }
    let transcript = match (args.transcript, args.transcript_file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading transcript {}", path.display()))?,
        (None, None) => String::new(),
    };
    Ok(CallLogRequest {
        caller_number: args.caller,
        transcript,
        scam_score: args.score,
        intent: args.intent,
        user_id: cfg.user_id.clone(),
    })
}
