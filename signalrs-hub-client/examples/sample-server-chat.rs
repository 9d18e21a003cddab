use signalrs_hub_client::{HubConnection, HubConnectionDelegate, SignalRClientError};
use std::{sync::Arc, time::Duration};
use tracing::*;
use tracing_subscriber::{self, filter, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    set_tracing_subscriber();

    let client1 = get_client("client1").await?;

    client1
        .method("Send")
        .arg("client1")?
        .arg("a message")?
        .send()
        .await?;

    let client2 = get_client("client2").await?;

    client2
        .method("Send")
        .arg("client2")?
        .arg("a message")?
        .send()
        .await?;

    tokio::time::sleep(Duration::from_secs(5)).await;

    client1.stop();
    client2.stop();

    Ok(())
}

async fn get_client(name: &str) -> anyhow::Result<HubConnection> {
    let (opened, outcome) = flume::bounded(1);

    let client = HubConnection::builder(format!("http://localhost:5261/chat?name={name}"))
        .with_delegate(Arc::new(OpenSignal(opened)))
        .build()?;

    client.on("Send", print);

    client.start();
    outcome.recv_async().await??;

    Ok(client)
}

struct OpenSignal(flume::Sender<Result<(), SignalRClientError>>);

impl HubConnectionDelegate for OpenSignal {
    fn connection_did_open(&self) {
        let _ = self.0.send(Ok(()));
    }

    fn connection_did_fail_to_open(&self, error: SignalRClientError) {
        let _ = self.0.send(Err(error));
    }

    fn connection_did_close(&self, error: Option<SignalRClientError>) {
        if let Some(error) = error {
            warn!("connection closed: {error}");
        }
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

fn print(message: String) {
    info!("{message}");
}
