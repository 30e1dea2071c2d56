//! Command implementations
//!
//! Every command takes its parsed arguments and the shared [`Context`] and
//! returns the process [`ExitCode`].

mod completions;
mod createbucket;
mod delete;
mod deletebucket;
mod get;
mod list;
mod listbuckets;
mod put;

use anyhow::Context as _;
use b2_client::{B2Client, Bucket};
use b2_core::{Config, ConfigManager};
use clap::{Args, Subcommand};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Options accepted by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Account ID (or application key ID)
    #[arg(long, env = "B2_ACCOUNT_ID", global = true, hide_env_values = true)]
    pub account: Option<String>,

    /// Application key
    #[arg(long, env = "B2_APP_KEY", global = true, hide_env_values = true)]
    pub app_key: Option<String>,

    /// Bucket to operate on
    #[arg(short, long, env = "B2_BUCKET", global = true)]
    pub bucket: Option<String>,

    /// Log HTTP requests and responses to stderr
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Show per-file detail
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl GlobalArgs {
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            quiet: self.quiet,
            verbose: self.verbose,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download files
    Get(get::GetArgs),

    /// Upload files
    Put(put::PutArgs),

    /// List files in the bucket
    #[command(alias = "ls")]
    List(list::ListArgs),

    /// List the buckets of the account
    Listbuckets(listbuckets::ListBucketsArgs),

    /// Create a bucket
    Createbucket(createbucket::CreateBucketArgs),

    /// Delete an empty bucket
    Deletebucket(deletebucket::DeleteBucketArgs),

    /// Delete or hide files
    #[command(alias = "rm")]
    Delete(delete::DeleteArgs),

    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

/// Resolved configuration and output settings shared by the commands
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub bucket: Option<String>,
    pub output: OutputConfig,
}

impl Context {
    /// Load the config file and apply the command-line overrides
    pub fn load(global: &GlobalArgs) -> anyhow::Result<Self> {
        let manager = ConfigManager::new()?;
        let mut config = manager
            .load()
            .with_context(|| format!("Failed to load {}", manager.config_path().display()))?;

        if let Some(account) = &global.account {
            config.account_id = Some(account.clone());
        }
        if let Some(key) = &global.app_key {
            config.application_key = Some(key.clone());
        }

        Ok(Self {
            config,
            bucket: global.bucket.clone(),
            output: global.output_config(),
        })
    }

    pub fn formatter(&self) -> Formatter {
        Formatter::new(self.output)
    }

    /// Client for the configured account
    pub fn client(&self, formatter: &Formatter) -> Result<B2Client, ExitCode> {
        B2Client::new(&self.config).map_err(|e| {
            formatter.error(&e.to_string());
            ExitCode::from_error(&e)
        })
    }

    /// The bucket named by `--bucket` / `B2_BUCKET`
    pub async fn bucket(&self, formatter: &Formatter) -> Result<Bucket, ExitCode> {
        let Some(name) = self.bucket.as_deref().filter(|n| !n.is_empty()) else {
            formatter.error("No bucket given (use --bucket or B2_BUCKET)");
            return Err(ExitCode::UsageError);
        };

        let client = self.client(formatter)?;
        client.bucket(name).await.map_err(|e| {
            formatter.error(&e.to_string());
            ExitCode::from_error(&e)
        })
    }
}

/// Execute a command
pub async fn execute(command: Commands, ctx: &Context) -> ExitCode {
    match command {
        Commands::Get(args) => get::execute(args, ctx).await,
        Commands::Put(args) => put::execute(args, ctx).await,
        Commands::List(args) => list::execute(args, ctx).await,
        Commands::Listbuckets(args) => listbuckets::execute(args, ctx).await,
        Commands::Createbucket(args) => createbucket::execute(args, ctx).await,
        Commands::Deletebucket(args) => deletebucket::execute(args, ctx).await,
        Commands::Delete(args) => delete::execute(args, ctx).await,
        Commands::Completions(args) => completions::execute(args),
    }
}

/// Thread count from the command line, falling back to the config file
fn thread_count(requested: Option<usize>, config: &Config) -> usize {
    requested.unwrap_or(config.threads).max(1)
}
