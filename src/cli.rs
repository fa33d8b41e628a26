use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use uploadbox::config::Config;
use uploadbox::preferences::Preferences;
use uploadbox::records::{CreatedBy, LocalBehaviour, NameCollisionPolicy, NewUpload, UploadStore};
use uploadbox::worker::AggregateResult;

use crate::AnyError;
use crate::server::{self, Services};

#[derive(Parser, Debug)]
#[command(name = "uploadbox")]
#[command(about = "Queued, batched file uploads", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $UPLOADBOX_CONFIG or config/uploadbox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Queue a file for upload
    Enqueue(EnqueueArgs),
    /// Show the queued uploads of an account
    List {
        #[arg(long)]
        account: String,
    },
    /// Upload pending files of an account now
    Run(RunArgs),
    /// Run the control API and upload queued files in the background
    Serve {
        /// Overrides server.bind_addr
        #[arg(long)]
        address: Option<SocketAddr>,
    },
    /// Pause all uploads
    Pause,
    /// Resume uploads
    Resume,
    /// Print the effective configuration
    Config,
}

#[derive(clap::Args, Debug)]
pub struct EnqueueArgs {
    #[arg(long)]
    pub account: String,
    /// File to upload
    #[arg(long)]
    pub local: PathBuf,
    /// Destination path under the account's remote root
    #[arg(long)]
    pub remote: String,
    #[arg(long, value_enum, default_value_t = BehaviourArg::Copy)]
    pub behaviour: BehaviourArg,
    #[arg(long, value_enum, default_value_t = CollisionArg::Rename)]
    pub on_collision: CollisionArg,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[arg(long)]
    pub account: String,
    /// Only these ids, in this order (default: everything pending)
    #[arg(long, value_delimiter = ',')]
    pub ids: Vec<u64>,
    /// Print batch events as JSON lines
    #[arg(long)]
    pub events: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum BehaviourArg {
    Copy,
    Move,
    Delete,
    Forget,
}

impl From<BehaviourArg> for LocalBehaviour {
    fn from(value: BehaviourArg) -> Self {
        match value {
            BehaviourArg::Copy => LocalBehaviour::Copy,
            BehaviourArg::Move => LocalBehaviour::Move,
            BehaviourArg::Delete => LocalBehaviour::Delete,
            BehaviourArg::Forget => LocalBehaviour::Forget,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CollisionArg {
    AskUser,
    Overwrite,
    Rename,
    Skip,
}

impl From<CollisionArg> for NameCollisionPolicy {
    fn from(value: CollisionArg) -> Self {
        match value {
            CollisionArg::AskUser => NameCollisionPolicy::AskUser,
            CollisionArg::Overwrite => NameCollisionPolicy::Overwrite,
            CollisionArg::Rename => NameCollisionPolicy::Rename,
            CollisionArg::Skip => NameCollisionPolicy::Skip,
        }
    }
}

impl Cli {
    pub fn load_config(&self) -> Result<Config, AnyError> {
        let config = match &self.config {
            Some(path) => {
                let _ = dotenvy::dotenv();
                Config::load_from_path(path)?
            }
            None => Config::load()?,
        };
        Ok(config)
    }
}

pub async fn execute(cli: Cli) -> Result<(), AnyError> {
    let mut config = cli.load_config()?;

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
        Commands::Serve { address } => {
            if let Some(address) = address {
                config.server.bind_addr = address;
            }
            server::run(config).await?;
        }
        Commands::Enqueue(args) => {
            let services = Services::from_config(&config, CancellationToken::new())?;
            let local = std::path::absolute(&args.local)?;
            let upload = NewUpload::new(args.account, local, args.remote)
                .with_local_behaviour(args.behaviour.into())
                .with_collision_policy(args.on_collision.into())
                .with_created_by(CreatedBy::User);
            let record = services.store.insert(upload).await?;
            services.flush();
            println!("{}", record.id);
        }
        Commands::List { account } => {
            let services = Services::from_config(&config, CancellationToken::new())?;
            for record in services.store.list(&account).await? {
                println!(
                    "{:>6}  {:<11}  {}  ->  {}{}",
                    record.id,
                    record.status.to_string(),
                    record.local_path.display(),
                    record.remote_path,
                    record
                        .last_result
                        .map(|code| format!("  ({code})"))
                        .unwrap_or_default()
                );
            }
        }
        Commands::Run(args) => run_uploads(&config, args).await?,
        Commands::Pause => set_paused(&config, true)?,
        Commands::Resume => set_paused(&config, false)?,
    }

    Ok(())
}

fn set_paused(config: &Config, paused: bool) -> Result<(), AnyError> {
    let services = Services::from_config(config, CancellationToken::new())?;
    services.state.preferences.set_global_upload_paused(paused)?;
    services.flush();
    info!(paused, "Global upload pause stored");
    Ok(())
}

async fn run_uploads(config: &Config, args: RunArgs) -> Result<(), AnyError> {
    let shutdown = CancellationToken::new();
    let services = Services::from_config(config, shutdown.clone())?;

    let printer = args.events.then(|| {
        let mut events = services.events.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    println!("{line}");
                }
            }
        })
    });

    // On a signal the run is stopped, not dropped, so interrupted uploads
    // are written back as queued before the store is flushed
    let outcomes = {
        let run = async {
            if args.ids.is_empty() {
                services.scheduler.run_pending(&args.account).await
            } else {
                Ok(services.scheduler.run_all(&args.account, &args.ids).await)
            }
        };
        tokio::pin!(run);

        tokio::select! {
            outcomes = &mut run => outcomes?,
            _ = server::shutdown_signal() => {
                shutdown.cancel();
                services.stop();
                run.await?
            }
        }
    };
    services.flush();
    // Dropping the services closes the event channel and ends the printer
    drop(services);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let overall = outcomes
        .iter()
        .map(|outcome| outcome.result)
        .fold(AggregateResult::Success, |acc, result| match (acc, result) {
            (AggregateResult::Failure, _) | (_, AggregateResult::Failure) => {
                AggregateResult::Failure
            }
            (AggregateResult::Retry, _) | (_, AggregateResult::Retry) => AggregateResult::Retry,
            _ => AggregateResult::Success,
        });
    info!(batches = outcomes.len(), result = %overall, "Upload run finished");

    if overall == AggregateResult::Failure {
        return Err("one or more uploads failed".into());
    }
    Ok(())
}
