//! Dropping root privileges once sockets are bound.
//!
//! Mirrors `drop_privileges()`: resolve the target user/group by name,
//! clear supplementary groups, set gid then uid in that order, and leave
//! a conservative umask behind. Uses `nix`'s safe wrappers rather than
//! raw `libc` calls so this crate can keep `#![forbid(unsafe_code)]`.

use nix::sys::stat::{Mode, umask};
use nix::unistd::{Uid, User, Group, setgid, setgroups, setuid};

use crate::error::{Error, Result};

pub(crate) fn drop_privileges(user: &str, group: &str) -> Result<()> {
    if !Uid::effective().is_root() {
        tracing::info!(user, group, "not running as root, skipping privilege drop");
        return Ok(());
    }

    let user_entry = User::from_name(user)
        .map_err(|e| Error::PrivilegeDrop(e.to_string()))?
        .ok_or_else(|| Error::UnknownUser(user.to_string()))?;
    let group_entry = Group::from_name(group)
        .map_err(|e| Error::PrivilegeDrop(e.to_string()))?
        .ok_or_else(|| Error::UnknownGroup(group.to_string()))?;

    setgroups(&[]).map_err(|e| Error::PrivilegeDrop(e.to_string()))?;
    setgid(group_entry.gid).map_err(|e| Error::PrivilegeDrop(e.to_string()))?;
    setuid(user_entry.uid).map_err(|e| Error::PrivilegeDrop(e.to_string()))?;

    umask(Mode::from_bits_truncate(0o077));

    tracing::info!(user, group, "dropped privileges");
    Ok(())
}
