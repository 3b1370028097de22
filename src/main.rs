use anyhow::{Context, Result};
use aws_config::SdkConfig;
use bytes::Bytes;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod cli;

use cli::{Cli, Commands};
use svckit::aws::utils::get_aws_config;
use svckit::config::Config;
use svckit::error::ErrorKind;
use svckit::listener::{Consumer, ConsumerConfig, ErrorSink, Message};
use svckit::publisher::{Publisher, PublisherConfig};
use svckit::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    if let Err(e) = telemetry::init_telemetry() {
        eprintln!("Failed to initialize telemetry: {}", e);
    }

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(region) = &cli.region {
        config.region = Some(region.clone());
    }
    info!("Loaded configuration: {}", config);

    let sdk_config = get_aws_config(config.region.as_deref()).await;

    let result = match cli.command {
        Commands::Listen { queue_url, max_messages, visibility_timeout, wait_time, raw } => {
            let mut listener = config.listener_config();
            if let Some(queue_url) = queue_url {
                listener.queue_url = queue_url;
            }
            if let Some(endpoint) = cli.endpoint {
                listener.endpoint = Some(endpoint);
            }
            listener.max_number_of_messages = max_messages.or(listener.max_number_of_messages);
            listener.visibility_timeout = visibility_timeout.or(listener.visibility_timeout);
            listener.wait_time_seconds = wait_time.or(listener.wait_time_seconds);

            listen_command(&sdk_config, listener, raw).await
        }
        Commands::Publish { topic_arn, message } => {
            let mut publisher = config.publisher_config();
            if let Some(topic_arn) = topic_arn {
                publisher.topic_arn = topic_arn;
            }
            if let Some(endpoint) = cli.endpoint {
                publisher.endpoint = Some(endpoint);
            }

            publish_command(&sdk_config, publisher, &message).await
        }
    };

    telemetry::shutdown_telemetry();
    result
}

async fn listen_command(sdk_config: &SdkConfig, config: ConsumerConfig, raw: bool) -> Result<()> {
    let consumer = Consumer::new(sdk_config, config).context("Failed to build consumer")?;
    let token = CancellationToken::new();
    let (sink, mut errors) = ErrorSink::unbounded();

    let drain = tokio::spawn(async move {
        while let Some(e) = errors.recv().await {
            match e.kind() {
                ErrorKind::Cancelled => warn!("{}", e),
                _ => error!(kind = ?e.kind(), "{}", e),
            }
        }
    });

    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping listener");
        }
        shutdown.cancel();
    });

    if raw {
        consumer
            .listen_raw(
                |_token: CancellationToken, payload: Bytes| async move {
                    info!(bytes = payload.len(), "{}", String::from_utf8_lossy(&payload));
                    anyhow::Ok(())
                },
                sink,
                token,
            )
            .await;
    } else {
        consumer
            .listen_until(
                |message: Message| async move {
                    info!(
                        message_id = %message.message_id,
                        topic_arn = %message.topic_arn,
                        timestamp = %message.timestamp,
                        "{}",
                        message.message
                    );
                    anyhow::Ok(())
                },
                sink,
                token,
            )
            .await;
    }

    drain.await.context("Error drain task failed")?;
    Ok(())
}

async fn publish_command(
    sdk_config: &SdkConfig,
    config: PublisherConfig,
    message: &str,
) -> Result<()> {
    let publisher = Publisher::new(sdk_config, config).context("Failed to build publisher")?;
    let message_id = publisher.publish(message).await?;
    info!("Published message {} to {}", message_id, publisher.topic_arn());
    println!("{}", message_id);
    Ok(())
}
