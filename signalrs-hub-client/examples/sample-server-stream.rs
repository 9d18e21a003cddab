use futures::StreamExt;
use signalrs_hub_client::{HubConnection, HubConnectionDelegate, SignalRClientError};
use std::sync::Arc;
use tracing::*;
use tracing_subscriber::{self, filter, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    set_tracing_subscriber();

    let (opened, outcome) = flume::bounded(1);

    let hub = HubConnection::builder("http://localhost:5261/streaming")
        .with_delegate(Arc::new(OpenSignal(opened)))
        .build()?;

    hub.start();
    outcome.recv_async().await??;

    let mut result = hub
        .method("AsyncEnumerableCounter")
        .arg(5)?
        .arg(1000)?
        .stream::<i32>()
        .await;

    while let Some(next) = result.next().await {
        info!("next = {}", next?);
    }

    info!("result stream finished");

    let mut cancelled = hub
        .method("AsyncEnumerableCounter")
        .arg(100)?
        .arg(100)?
        .stream::<i32>()
        .await;

    if let Some(first) = cancelled.next().await {
        info!("first = {}", first?);
    }

    hub.cancel_stream_invocation(cancelled.handle()).await?;

    info!("stream cancelled");

    hub.stop();

    Ok(())
}

struct OpenSignal(flume::Sender<Result<(), SignalRClientError>>);

impl HubConnectionDelegate for OpenSignal {
    fn connection_did_open(&self) {
        let _ = self.0.send(Ok(()));
    }

    fn connection_did_fail_to_open(&self, error: SignalRClientError) {
        let _ = self.0.send(Err(error));
    }
}

fn set_tracing_subscriber() {
    let targets_filter = filter::Targets::new()
        .with_target("signalrs_hub_client", Level::TRACE)
        .with_default(Level::DEBUG);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_line_number(false)
        .with_file(false)
        .without_time()
        .compact();

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(targets_filter)
        .init();
}
