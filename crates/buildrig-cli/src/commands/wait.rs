// `buildrig wait`: poll one condition

use std::path::PathBuf;

use clap::{Args, Subcommand};
use reqwest::Client;
use tracing::{error, info};

use buildrig_config::Settings;
use buildrig_poll::{conditions, retry_until};

use super::PollArgs;

#[derive(Args, Debug)]
pub struct WaitArgs {
    #[command(flatten)]
    pub poll: PollArgs,

    #[command(subcommand)]
    pub condition: Condition,
}

#[derive(Subcommand, Debug)]
pub enum Condition {
    /// A file exists
    File { path: PathBuf },
    /// A URL answers (optionally with a given status or body)
    Url {
        url: String,
        #[arg(long)]
        status: Option<u16>,
        #[arg(long)]
        body: Option<String>,
    },
    /// A URL stops answering
    Down { url: String },
    /// Nothing listens on HOST:PORT any more
    PortClosed { addr: String },
}

pub async fn execute(args: WaitArgs, settings: &Settings) -> anyhow::Result<i32> {
    let policy = args.poll.policy(&settings.poll);
    let client = Client::new();
    let client = &client;

    let result = match &args.condition {
        Condition::File { path } => retry_until(&policy, || conditions::file_exists(path)).await,
        Condition::Url { url, status, body } => {
            retry_until(&policy, move || async move {
                match (status, body) {
                    (_, Some(body)) => conditions::http_body_equals(client, url, body).await,
                    (Some(status), None) => conditions::http_status(client, url, *status).await,
                    (None, None) => conditions::http_ok(client, url).await.map(drop),
                }
            })
            .await
        }
        Condition::Down { url } => retry_until(&policy, || conditions::http_down(client, url)).await,
        Condition::PortClosed { addr } => {
            retry_until(&policy, || conditions::port_closed(addr)).await
        }
    };

    match result {
        Ok(()) => {
            info!(condition = ?args.condition, "Condition met");
            Ok(0)
        }
        Err(e) => {
            error!(condition = ?args.condition, attempts = e.attempts(), "{}", e);
            Ok(1)
        }
    }
}
