use clap::{Parser, Subcommand};
use epochgate::{Config, common, init_tracing, run};

/// Epochgate - routing gateway for sharded chain data nodes
#[derive(Parser)]
#[command(name = "epochgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway server (also the default with no subcommand)
    Daemon,

    /// Generate a fresh random access key
    Keygen,

    /// Create a default config.toml if none exists
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Keygen) => {
            println!("{}", common::generate_key());
            Ok(())
        }
        Some(Commands::Init) => {
            if Config::create_default_if_missing()? {
                println!("Config file created. Edit config.toml and run again.");
            } else {
                println!("config.toml already exists.");
            }
            Ok(())
        }
        Some(Commands::Daemon) | None => {
            let config = Config::load()?;
            init_tracing(&config.general.log_level);
            run(config).await
        }
    }
}
