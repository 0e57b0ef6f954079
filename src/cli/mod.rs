use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "transcript-server",
    about = "YouTube transcript service - fetch captions through a residential proxy pool",
    version,
    long_about = "An authenticated HTTP service that retrieves YouTube transcripts through a rotating or backbone residential proxy, plus CLI helpers for one-off fetches and egress checks."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Port to listen on (overrides server.port)
        #[arg(short, long, env = "PORT", value_name = "PORT")]
        port: Option<u16>,
    },

    /// Fetch a single transcript through the configured proxy
    Fetch {
        /// 11-character YouTube video ID
        #[arg(value_name = "VIDEO_ID")]
        video_id: String,

        /// Print the response body as JSON instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Report the egress IP seen by an IP-echo service
    Probe {
        /// Probe without going through the proxy
        #[arg(long)]
        direct: bool,
    },

    /// Show or initialize the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Let --init replace an existing configuration file
        #[arg(long, requires = "init")]
        force: bool,
    },
}
