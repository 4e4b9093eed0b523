//! Host tag discovery.

use tracing::warn;

const MAX_HOSTNAME_LEN: usize = 256;

/// Returns the system hostname, if it can be determined.
///
/// Failure is not fatal: a warning is logged and `None` is returned, in which case callers simply omit the host tag.
pub fn system_hostname() -> Option<String> {
    match query_hostname() {
        Some(hostname) if !hostname.is_empty() => Some(hostname),
        _ => {
            warn!("Failed to determine system hostname, host tag will be omitted.");
            None
        }
    }
}

#[cfg(unix)]
fn query_hostname() -> Option<String> {
    let mut buf = [0u8; MAX_HOSTNAME_LEN];

    // SAFETY: `buf` is valid for writes of `buf.len()` bytes, and `gethostname` writes at most that many bytes.
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if ret != 0 {
        return None;
    }

    // The name may be truncated without a terminating NUL, so find the end ourselves rather than trusting it.
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..len]).into_owned())
}

#[cfg(not(unix))]
fn query_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok()
        .filter(|name| name.len() < MAX_HOSTNAME_LEN)
}
