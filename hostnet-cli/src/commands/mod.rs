use crate::cli::Commands;
use anyhow::Result;

pub mod attach;
pub mod detach;
pub mod devices;
pub mod health;
pub mod serve;

/// Dispatch command to appropriate handler
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Serve(args) => serve::execute(args).await,

        Commands::Attach(args) => attach::execute(args).await,

        Commands::Detach {
            netns,
            device,
            restore_name,
        } => detach::execute(&netns, &device, restore_name.as_ref()).await,

        Commands::Devices { all } => devices::execute(all).await,

        Commands::Health => health::execute().await,
    }
}
