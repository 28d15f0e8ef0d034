//! Privilege drop, applied once at startup after listeners are bound
//! (binding low ports needs the privilege; serving requests does not).
//!
//! Order matters and is fixed, not configurable: look up the target user
//! while still root, drop group privileges (`initgroups` + `setgid`), only
//! then `chroot`, and drop user privileges last. Dropping the GID before the
//! `chroot` means `initgroups` can still read `/etc/group` from the real
//! root; dropping the UID last means the `chroot` syscall itself still runs
//! as root, which it requires.

use std::ffi::CString;
use std::io;

use crate::error::{EngineError, Result};

/// No-ops on either half when the corresponding string is empty. The user
/// drop itself is skipped when not running as root (started already
/// unprivileged, e.g. under a supervisor that dropped to the target user
/// before exec); chroot still applies, since it only needs `CAP_SYS_CHROOT`
/// rather than a fresh process identity.
pub fn apply(chroot_dir: &str, user: &str) -> Result<()> {
    if user.is_empty() || unsafe { libc::geteuid() } != 0 {
        if !chroot_dir.is_empty() {
            do_chroot(chroot_dir)?;
        }
        return Ok(());
    }

    let (uid, gid) = lookup_user(user)?;
    drop_group(user, gid)?;
    if !chroot_dir.is_empty() {
        do_chroot(chroot_dir)?;
    }
    drop_user(uid)?;
    tracing::info!(user, uid, gid, "dropped privileges");
    Ok(())
}

fn lookup_user(user: &str) -> Result<(libc::uid_t, libc::gid_t)> {
    let c_user = CString::new(user).map_err(|_| EngineError::UnknownUser(user.to_string()))?;
    // SAFETY: getpwnam returns a pointer into a thread-local static buffer;
    // the uid/gid fields are copied out before any other libc call that
    // could invalidate it.
    unsafe {
        let pwd = libc::getpwnam(c_user.as_ptr());
        if pwd.is_null() {
            return Err(EngineError::UnknownUser(user.to_string()));
        }
        Ok(((*pwd).pw_uid, (*pwd).pw_gid))
    }
}

fn drop_group(user: &str, gid: libc::gid_t) -> Result<()> {
    let c_user = CString::new(user).map_err(|_| EngineError::UnknownUser(user.to_string()))?;
    if unsafe { libc::initgroups(c_user.as_ptr(), gid) } != 0 {
        return Err(EngineError::PrivilegeDrop(io::Error::last_os_error().to_string()));
    }
    if unsafe { libc::setgid(gid) } != 0 {
        return Err(EngineError::PrivilegeDrop(io::Error::last_os_error().to_string()));
    }
    Ok(())
}

fn drop_user(uid: libc::uid_t) -> Result<()> {
    if unsafe { libc::setuid(uid) } != 0 {
        return Err(EngineError::PrivilegeDrop(io::Error::last_os_error().to_string()));
    }
    Ok(())
}

fn do_chroot(dir: &str) -> Result<()> {
    let c_dir = CString::new(dir)
        .map_err(|_| EngineError::Chroot(io::Error::new(io::ErrorKind::InvalidInput, "nul byte in chroot path")))?;
    if unsafe { libc::chroot(c_dir.as_ptr()) } != 0 {
        return Err(EngineError::Chroot(io::Error::last_os_error()));
    }
    let root = CString::new("/").unwrap();
    if unsafe { libc::chdir(root.as_ptr()) } != 0 {
        return Err(EngineError::Chroot(io::Error::last_os_error()));
    }
    tracing::info!(dir, "chrooted");
    Ok(())
}
