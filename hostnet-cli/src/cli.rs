//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use hostnet_core::{DeviceName, HardwareAddr, NamespaceRef};
use ipnetwork::IpNetwork;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hostnet")]
#[command(about = "Host network device relocation driver", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the driver: publish devices and follow the lifecycle feed
    Serve(ServeArgs),

    /// Move a host device into a network namespace
    Attach(AttachArgs),

    /// Move a device from a network namespace back to the host
    Detach {
        /// Network namespace path or PID
        #[arg(short, long)]
        netns: NamespaceRef,

        /// Device name inside the namespace
        #[arg(short, long)]
        device: DeviceName,

        /// Name to give the device on the host
        #[arg(long)]
        restore_name: Option<DeviceName>,
    },

    /// List host devices that can be relocated
    Devices {
        /// Include loopback, down and excluded devices
        #[arg(short, long)]
        all: bool,
    },

    /// Check system requirements
    Health,
}

#[derive(Args)]
pub struct ServeArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Node name devices are published under (default: hostname)
    #[arg(long)]
    pub node_name: Option<String>,

    /// Newline-delimited JSON lifecycle feed (a file is followed, a FIFO read until closed)
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Seconds between device publications
    #[arg(long)]
    pub publish_interval: Option<u64>,
}

#[derive(Args)]
pub struct AttachArgs {
    /// Host device name
    #[arg(short, long)]
    pub device: DeviceName,

    /// Network namespace path or PID
    #[arg(short, long)]
    pub netns: NamespaceRef,

    /// Name inside the namespace
    #[arg(long)]
    pub name: Option<DeviceName>,

    /// MTU
    #[arg(long)]
    pub mtu: Option<u32>,

    /// Hardware address (aa:bb:cc:dd:ee:ff)
    #[arg(long)]
    pub hardware_address: Option<HardwareAddr>,

    /// Address in CIDR notation, may be repeated
    #[arg(short, long = "address")]
    pub addresses: Vec<IpNetwork>,
}
