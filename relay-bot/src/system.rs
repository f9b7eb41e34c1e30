//! Host-side effects behind the owner commands.
//!
//! Interface enumeration, the public IP lookup and reboot all live behind
//! [`SystemOps`] so the router can be exercised without touching the host.

use crate::error::CommandError;
use async_trait::async_trait;
use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use nix::sys::socket::SockaddrStorage;
use relay_common::SystemConfig;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const SEPARATOR: &str = "######################";

/// A network interface and the addresses bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

/// OS operations available to the owner.
#[async_trait]
pub trait SystemOps: Send + Sync {
    /// Interfaces that are up, not loopback, and carry an address.
    fn network_interfaces(&self) -> Result<Vec<InterfaceInfo>, CommandError>;

    /// Raw output of the external IP lookup.
    async fn public_ip_info(&self) -> Result<String, CommandError>;

    /// Start a reboot. Returns once the command has been launched.
    async fn reboot(&self) -> Result<(), CommandError>;
}

/// One address as reported by the interface enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub interface: String,
    pub addr: IpAddr,
    pub is_up: bool,
    pub is_loopback: bool,
}

/// Group address entries into active interfaces.
///
/// Entries of interfaces that are down or loopback are dropped; interface
/// order follows first appearance.
pub fn group_interfaces<I>(entries: I) -> Vec<InterfaceInfo>
where
    I: IntoIterator<Item = AddressEntry>,
{
    let mut grouped: Vec<InterfaceInfo> = Vec::new();

    for entry in entries {
        if !entry.is_up || entry.is_loopback || entry.addr.is_loopback() {
            continue;
        }
        match grouped.iter_mut().find(|i| i.name == entry.interface) {
            Some(iface) => iface.addresses.push(entry.addr),
            None => grouped.push(InterfaceInfo {
                name: entry.interface,
                addresses: vec![entry.addr],
            }),
        }
    }

    grouped
}

/// Render interfaces as the reply to the `ip` command.
pub fn format_interfaces(interfaces: &[InterfaceInfo]) -> String {
    if interfaces.is_empty() {
        return "No active network interfaces".to_string();
    }

    let mut out = String::new();
    for iface in interfaces {
        out.push_str(SEPARATOR);
        out.push_str("\nName: ");
        out.push_str(&iface.name);
        out.push('\n');
        for addr in &iface.addresses {
            out.push_str(&format!("IP Address: {addr}\n"));
        }
    }
    out
}

/// [`SystemOps`] for the machine the bot runs on.
pub struct HostSystem {
    ip_lookup_command: Vec<String>,
    reboot_command: Vec<String>,
    command_timeout: Duration,
}

impl HostSystem {
    pub fn new(
        ip_lookup_command: Vec<String>,
        reboot_command: Vec<String>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            ip_lookup_command,
            reboot_command,
            command_timeout,
        }
    }

    pub fn from_config(config: &SystemConfig) -> Self {
        Self::new(
            config.ip_lookup_command.clone(),
            config.reboot_command.clone(),
            Duration::from_secs(config.command_timeout_secs),
        )
    }
}

/// IP of an `AF_INET`/`AF_INET6` address; link-layer entries have none.
fn socket_ip(addr: &SockaddrStorage) -> Option<IpAddr> {
    if let Some(v4) = addr.as_sockaddr_in() {
        return Some(IpAddr::V4(v4.ip()));
    }
    addr.as_sockaddr_in6().map(|v6| IpAddr::V6(v6.ip()))
}

fn build_command(argv: &[String], what: &'static str) -> Result<(String, Command), CommandError> {
    let (program, args) = argv
        .split_first()
        .ok_or(CommandError::NotConfigured(what))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok((program.clone(), cmd))
}

#[async_trait]
impl SystemOps for HostSystem {
    fn network_interfaces(&self) -> Result<Vec<InterfaceInfo>, CommandError> {
        let addrs = getifaddrs().map_err(|errno| CommandError::Interfaces(errno.into()))?;
        Ok(group_interfaces(addrs.filter_map(|ifaddr| {
            let addr = ifaddr.address.as_ref().and_then(socket_ip)?;
            Some(AddressEntry {
                addr,
                is_up: ifaddr.flags.contains(InterfaceFlags::IFF_UP),
                is_loopback: ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK),
                interface: ifaddr.interface_name,
            })
        })))
    }

    async fn public_ip_info(&self) -> Result<String, CommandError> {
        let (program, mut cmd) = build_command(&self.ip_lookup_command, "ip lookup")?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(CommandError::Spawn { program, source }),
            Err(_) => {
                return Err(CommandError::Timeout {
                    program,
                    secs: self.command_timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            tracing::warn!(
                program = %program,
                code = ?output.status.code(),
                "IP lookup exited unsuccessfully"
            );
        }

        // Combined output, like a terminal would show it.
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }

    async fn reboot(&self) -> Result<(), CommandError> {
        let (program, mut cmd) = build_command(&self.reboot_command, "reboot")?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        cmd.spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?;

        tracing::warn!(program = %program, "Reboot command launched");
        Ok(())
    }
}
