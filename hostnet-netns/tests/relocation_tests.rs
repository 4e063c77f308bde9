use std::process::Command;

use hostnet_core::{DeviceName, Error, HardwareAddr, LinkConfig, NamespaceRef};
use hostnet_netns::*;
use netlink_packet_route::link::{LinkAttribute, LinkFlag};

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::getuid() == 0 }
}

fn ip(args: &[&str]) {
    let status = Command::new("ip").args(args).status().expect("ip not found");
    assert!(status.success(), "ip {args:?} failed");
}

fn ip_output(args: &[&str]) -> String {
    let output = Command::new("ip").args(args).output().expect("ip not found");
    assert!(output.status.success(), "ip {args:?} failed");
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Named namespace plus a dummy link in the host namespace, removed on drop
struct Fixture {
    ns_name: String,
    link_name: String,
}

impl Fixture {
    fn new(tag: &str) -> Self {
        let fixture = Self {
            ns_name: format!("hostnet-{tag}-{}", std::process::id()),
            link_name: format!("hnt{tag}0"),
        };
        ip(&["netns", "add", &fixture.ns_name]);
        ip(&["link", "add", &fixture.link_name, "type", "dummy"]);
        ip(&["link", "set", &fixture.link_name, "up"]);
        fixture
    }

    fn ns(&self) -> NamespaceRef {
        NamespaceRef::path(format!("/run/netns/{}", self.ns_name))
    }

    fn device(&self) -> DeviceName {
        DeviceName::new(self.link_name.clone()).unwrap()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = Command::new("ip").args(["link", "del", &self.link_name]).status();
        let _ = Command::new("ip").args(["netns", "del", &self.ns_name]).status();
    }
}

#[tokio::test]
#[ignore] // Requires netlink access
async fn test_attach_unknown_device_is_not_found() {
    let device = DeviceName::new("hnt-missing0").unwrap();
    let err = attach(
        &device,
        &NamespaceRef::path("/run/netns/unused"),
        &LinkConfig::new(),
        &[],
    )
    .await
    .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
#[ignore] // Requires root
async fn test_detach_from_missing_namespace() {
    let device = DeviceName::new("eth0").unwrap();
    let err = detach(&NamespaceRef::path("/run/netns/hostnet-absent"), &device, None)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires root
async fn test_attach_detach_round_trip() {
    assert!(is_root(), "round trip needs CAP_NET_ADMIN");

    let fixture = Fixture::new("rt");
    let hw = HardwareAddr::from_bytes(vec![0x02, 0x42, 0, 0, 0, 0x13]);
    let config = LinkConfig::new().with_mtu(1400).with_hardware_addr(hw.clone());
    let address = "169.254.169.13/32".parse().unwrap();

    let data = attach(&fixture.device(), &fixture.ns(), &config, &[address])
        .await
        .unwrap();

    assert_eq!(data.interface_name, fixture.link_name);
    assert_eq!(data.hardware_address, hw.to_string());
    assert_eq!(data.ips, vec!["169.254.169.13".to_string()]);

    // Gone from the host, present and up in the namespace
    let host = NetlinkHandle::current().unwrap();
    assert!(host.link_by_name(&fixture.link_name).await.unwrap_err().is_not_found());

    let ns_ctx = NamespaceContext::open(&fixture.ns()).unwrap();
    let in_ns = NetlinkHandle::in_namespace(&ns_ctx).unwrap();
    let moved = in_ns.link_by_name(&fixture.link_name).await.unwrap();
    assert!(moved.header.flags.contains(&LinkFlag::Up));
    assert!(moved.attributes.contains(&LinkAttribute::Mtu(1400)));

    detach(&fixture.ns(), &fixture.device(), Some(&fixture.device()))
        .await
        .unwrap();

    let restored = host.link_by_name(&fixture.link_name).await.unwrap();
    assert!(restored.header.flags.contains(&LinkFlag::Up));
    assert!(in_ns.link_by_name(&fixture.link_name).await.unwrap_err().is_not_found());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires root
async fn test_attach_with_rename_and_alias_restore() {
    assert!(is_root(), "rename needs CAP_NET_ADMIN");

    let fixture = Fixture::new("al");
    ip(&["link", "set", &fixture.link_name, "alias", &fixture.link_name]);

    let renamed = DeviceName::new("net1").unwrap();
    let data = attach(
        &fixture.device(),
        &fixture.ns(),
        &LinkConfig::new().with_name(renamed.clone()),
        &[],
    )
    .await
    .unwrap();
    assert_eq!(data.interface_name, "net1");

    // No restore name: the alias recorded on the link wins
    detach(&fixture.ns(), &renamed, None).await.unwrap();

    let host = NetlinkHandle::current().unwrap();
    assert!(host.link_by_name(&fixture.link_name).await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires root
async fn test_rejected_address_keeps_earlier_ones() {
    assert!(is_root(), "address assignment needs CAP_NET_ADMIN");

    let fixture = Fixture::new("ad");
    let first = "169.254.169.13/32".parse().unwrap();
    let second = "169.254.169.14/32".parse().unwrap();

    // The kernel refuses an address the link already carries
    let err = attach(
        &fixture.device(),
        &fixture.ns(),
        &LinkConfig::new(),
        &[first, second, first],
    )
    .await
    .unwrap_err();

    match err {
        Error::AddressAssignment {
            address, namespace, ..
        } => {
            assert_eq!(address, "169.254.169.13/32");
            assert_eq!(namespace, fixture.ns().to_string());
        }
        other => panic!("expected an address assignment error, got {other}"),
    }

    // No rollback: the device moved and keeps what was applied
    let shown = ip_output(&[
        "-n",
        &fixture.ns_name,
        "-o",
        "addr",
        "show",
        "dev",
        &fixture.link_name,
    ]);
    assert!(shown.contains("169.254.169.13/32"), "{shown}");
    assert!(shown.contains("169.254.169.14/32"), "{shown}");

    detach(&fixture.ns(), &fixture.device(), Some(&fixture.device()))
        .await
        .unwrap();
}
