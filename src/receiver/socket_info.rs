//! Debug side-effect file tying each group's upstream local port to its
//! member client addresses. Observational only; nothing reads it back.

use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::group::ConnGroup;

pub const SRT_SOCKET_INFO_PREFIX: &str = "/tmp/srtla-group-";

pub fn info_file_path(prefix: &str, local_port: u16) -> PathBuf {
    PathBuf::from(format!("{prefix}{local_port}"))
}

pub fn write_info_file(prefix: &str, local_port: u16, addrs: &[IpAddr]) {
    let path = info_file_path(prefix, local_port);
    let mut contents = String::new();
    for addr in addrs {
        contents.push_str(&addr.to_string());
        contents.push('\n');
    }
    match fs::write(&path, contents) {
        Ok(()) => debug!("wrote socket info file {}", path.display()),
        Err(err) => warn!("failed to write socket info file {}: {}", path.display(), err),
    }
}

pub fn remove_info_file(prefix: &str, local_port: u16) {
    let _ = fs::remove_file(info_file_path(prefix, local_port));
}

/// Rewrite the group's info file; a no-op until the upstream socket exists.
pub fn write_group_info(group: &ConnGroup) {
    if let Some(link) = &group.upstream {
        write_info_file(SRT_SOCKET_INFO_PREFIX, link.local_port, &group.client_addresses());
    }
}

pub fn remove_group_info(group: &ConnGroup) {
    if let Some(link) = &group.upstream {
        remove_info_file(SRT_SOCKET_INFO_PREFIX, link.local_port);
    }
}
