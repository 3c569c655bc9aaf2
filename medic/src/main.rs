use medic::cli::{ReplCommand, HELP};
use medic::config::Config;
use medic::Session;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the JSON stream; logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "medic=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    info!(?config, "medic starting");

    let session = Session::local(&config).await?;

    let mut inspections = session.inspections();
    let mut notices = session.notices();
    let printer = tokio::spawn(async move {
        loop {
            let line = tokio::select! {
                inspection = inspections.recv() => match inspection {
                    Ok(inspection) => serde_json::to_string(&serde_json::json!({ "inspection": inspection })),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(missed = n, "Inspection output lagged");
                        continue;
                    }
                    Err(_) => break,
                },
                notice = notices.recv() => match notice {
                    Ok(notice) => serde_json::to_string(&serde_json::json!({ "notice": notice })),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(missed = n, "Notice output lagged");
                        continue;
                    }
                    Err(_) => break,
                },
            };
            match line {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!(error = %e, "Failed to encode output"),
            }
        }
    });

    eprintln!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match ReplCommand::parse(&line) {
            Ok(command) => command,
            Err(medic::cli::ParseError::Empty) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match command {
            ReplCommand::Ui(command) => {
                if let Err(e) = session.dispatch(command).await {
                    tracing::error!(error = %e, "Command failed");
                }
            }
            ReplCommand::State => match session.snapshot().await {
                Ok(snapshot) => println!("{}", serde_json::json!({ "snapshot": snapshot })),
                Err(e) => tracing::error!(error = %e, "Snapshot failed"),
            },
            ReplCommand::Help => eprintln!("{HELP}"),
            ReplCommand::Quit => break,
        }
    }

    session.shutdown().await;
    printer.abort();
    info!("medic stopped");
    Ok(())
}
