use anyhow::Context;

use common::CallStatus;
use realtime::{ApiClient, ClientConfig};

pub async fn outcome(cfg: &ClientConfig, id: &str, outcome: CallStatus) -> anyhow::Result<()> {
    let api = ApiClient::from_config(cfg)?;
    api.update_call_outcome(id, outcome)
        .await
        .with_context(|| format!("updating outcome of call {id}"))?;
    println!("call {id} marked {outcome}");
    Ok(())
}
