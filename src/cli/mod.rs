use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "svckit")]
#[command(about = "Queue listener and topic publisher", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Endpoint override for local backends such as LocalStack
    #[arg(long, global = true)]
    pub endpoint: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Consume a queue until interrupted, logging every message
    Listen {
        #[arg(long)]
        queue_url: Option<String>,

        #[arg(long)]
        max_messages: Option<i32>,

        #[arg(long)]
        visibility_timeout: Option<i32>,

        #[arg(long)]
        wait_time: Option<i32>,

        /// Skip envelope decoding and log raw bodies
        #[arg(long)]
        raw: bool,
    },
    /// Publish a single message to a topic
    Publish {
        #[arg(long)]
        topic_arn: Option<String>,

        message: String,
    },
}
