use anyhow::Context;

use common::CallRecord;
use realtime::{ApiClient, ClientConfig};

use super::util::{format_duration, local_time, percent, print_json};

pub async fn stats(cfg: &ClientConfig, json: bool) -> anyhow::Result<()> {
    let api = ApiClient::from_config(cfg)?;
    let stats = api.dashboard_stats().await.context("fetching dashboard stats")?;
    if json {
        return print_json(&stats);
    }
    println!("total calls     {}", stats.total_calls);
    println!("today           {}", stats.today_calls);
    println!("scams blocked   {} ({})", stats.scams_blocked, percent(stats.block_rate));
    println!("time saved      {:.1} min", stats.time_saved_minutes);
    println!("avg duration    {:.1} s", stats.avg_call_duration);
    println!("status          {}", stats.current_status);
    Ok(())
}

pub async fn calls(cfg: &ClientConfig, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let api = ApiClient::from_config(cfg)?;
    let limit = limit.unwrap_or(cfg.fetch.recent_limit);
    let calls = api.recent_calls(limit).await.context("fetching recent calls")?;
    if json {
        return print_json(&calls);
    }
    if calls.is_empty() {
        println!("no calls");
        return Ok(());
    }
    println!("{:<20} {:<16} {:<10} {:>5} {:>8}  {}", "TIME", "CALLER", "STATUS", "SCORE", "DURATION", "ID");
    for c in &calls {
        println!(
            "{:<20} {:<16} {:<10} {:>5.2} {:>8}  {}",
            local_time(&c.created_at, "%Y-%m-%d %H:%M:%S"),
            c.caller_number,
            c.status,
            c.scam_score,
            format_duration(c.duration),
            c.id
        );
    }
    Ok(())
}

pub async fn call(cfg: &ClientConfig, id: &str, json: bool) -> anyhow::Result<()> {
    let api = ApiClient::from_config(cfg)?;
    let record = api.call(id).await.with_context(|| format!("fetching call {id}"))?;
    if json {
        return print_json(&record);
    }
    print!("{}", render_call(&record));
    Ok(())
}

/// Multi-line detail block, shared with the dashboard overlay.
pub fn render_call(c: &CallRecord) -> String {
    let mut out = String::new();
    let caller = match &c.caller_name {
        Some(name) => format!("{} ({name})", c.caller_number),
        None => c.caller_number.clone(),
    };
    out.push_str(&format!("id        {}\n", c.id));
    out.push_str(&format!("caller    {caller}\n"));
    out.push_str(&format!("time      {}\n", local_time(&c.created_at, "%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!("status    {}\n", c.status));
    out.push_str(&format!("score     {:.2}\n", c.scam_score));
    out.push_str(&format!("intent    {}\n", c.intent));
    out.push_str(&format!("duration  {}\n", format_duration(c.duration)));
    if let Some(summary) = &c.summary {
        out.push_str(&format!("summary   {summary}\n"));
    }
    if let Some(reason) = &c.reason {
        out.push_str(&format!("reason    {reason}\n"));
    }
    if let Some(transcript) = &c.transcript {
        out.push_str("transcript\n");
        for line in transcript.lines() {
            out.push_str(&format!("  {line}\n"));
        }
    }
    out
}
