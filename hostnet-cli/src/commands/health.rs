use anyhow::Result;
use hostnet_netns::{NamespaceContext, NetlinkHandle, HOST_NAMESPACE_PATH};
use std::path::Path;

/// Execute health check command
pub async fn execute() -> Result<()> {
    println!("\n🏥 Hostnet Health Check\n");
    println!("{:-<60}", "");

    // Check 1: Permissions
    check_permissions();

    // Check 2: Network namespace support
    check_namespace_support()?;

    // Check 3: Route netlink
    check_netlink().await?;

    println!("{:-<60}", "");
    println!("\n✅ All systems operational!\n");

    Ok(())
}

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::getuid() == 0 }
}

/// Relocation needs `CAP_NET_ADMIN`; inspection works without it
fn check_permissions() {
    print!("Checking permissions... ");

    if is_root() {
        println!("✅ OK (root)");
    } else {
        println!("⚠️  NOT ROOT");
        println!("   Listing devices works, moving them needs CAP_NET_ADMIN");
        println!("   Try: sudo hostnet health");
    }
}

/// Check that network namespaces can be opened
fn check_namespace_support() -> Result<()> {
    print!("Checking network namespace support... ");

    if let Err(e) = NamespaceContext::host() {
        println!("❌ NOT SUPPORTED");
        anyhow::bail!(
            "Cannot open {HOST_NAMESPACE_PATH}: {e}\n\
             \n\
             Your kernel may be compiled without network namespace support."
        );
    }

    if Path::new("/run/netns").is_dir() {
        println!("✅ OK (/run/netns present)");
    } else {
        println!("✅ OK");
        println!("   /run/netns does not exist; named namespaces are unavailable");
    }

    Ok(())
}

/// Check that route netlink answers a link dump
async fn check_netlink() -> Result<()> {
    print!("Checking route netlink... ");

    let handle = match NetlinkHandle::current() {
        Ok(handle) => handle,
        Err(e) => {
            println!("❌ UNAVAILABLE");
            anyhow::bail!("Cannot open a netlink socket: {e}");
        }
    };

    match handle.links().await {
        Ok(links) => {
            println!("✅ OK ({} links)", links.len());
            Ok(())
        }
        Err(e) => {
            println!("❌ ERROR");
            anyhow::bail!("Link dump failed: {e}");
        }
    }
}
