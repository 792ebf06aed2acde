use anyhow::Context;

use realtime::{ApiClient, ClientConfig};

pub async fn health(cfg: &ClientConfig) -> anyhow::Result<()> {
    let api = ApiClient::from_config(cfg)?;
    let h = api.realtime_health().await.context("probing realtime service")?;
    println!("{} ({} connections, {} users) at {}", h.status, h.active_connections, h.active_users, api.base_url());
    Ok(())
}
