use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::warn;

use common::encode_event;
use realtime::{ClientConfig, Dispatcher, HttpTransport, Subscription};

use super::util::describe_event;

/// Print one line per event until interrupted or the stream gives up.
pub async fn watch(cfg: &ClientConfig, json: bool) -> anyhow::Result<()> {
    let transport = Arc::new(HttpTransport::new(cfg.fetch.timeout()).context("building http client")?);
    let url = cfg.stream_url()?;

    let mut dispatcher = Dispatcher::new();
    dispatcher.on_any(move |ev| {
        if !json {
            println!("{} {}", ev.timestamp, describe_event(ev));
            return;
        }
        match encode_event(ev) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to encode event"),
        }
    });

    let mut sub = Subscription::new(transport, url.to_string(), cfg.reconnect).with_dispatcher(dispatcher);
    sub.on_error(|err| eprintln!("stream error: {err}"));
    let handle = sub.spawn();
    let mut status = handle.status_watch();
    eprintln!("watching {url} (ctrl-c to stop)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.close();
                eprintln!("stopped");
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *status.borrow_and_update();
                eprintln!("-- {state}");
                if state.is_terminal() {
                    break;
                }
            }
        }
    }
    match handle.join().await {
        Some(err) => Err(anyhow!(err)).context("event stream gave up"),
        None => Ok(()),
    }
}
