//! Safari preference target resolution.
//!
//! Newer Safari builds keep preferences inside their sandbox container;
//! older ones use the shared preferences folder. Writing to the legacy domain
//! on a sandboxed system would only leave a ghost plist behind, so the
//! container must be used whenever it exists.
use serde::Serialize;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

pub const SAFARI_BUNDLE_ID: &str = "com.apple.Safari";

/// Where Safari preferences live for the current user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SafariTarget {
    Sandboxed { domain: String, plist_path: PathBuf },
    Legacy { domain: String, plist_path: PathBuf },
    InaccessibleSandboxed { plist_path: PathBuf },
}

impl SafariTarget {
    /// Preference domain to read and write, when reachable.
    pub fn domain(&self) -> Option<&str> {
        match self {
            SafariTarget::Sandboxed { domain, .. } | SafariTarget::Legacy { domain, .. } => {
                Some(domain)
            }
            SafariTarget::InaccessibleSandboxed { .. } => None,
        }
    }

    pub fn plist_path(&self) -> &Path {
        match self {
            SafariTarget::Sandboxed { plist_path, .. }
            | SafariTarget::Legacy { plist_path, .. }
            | SafariTarget::InaccessibleSandboxed { plist_path } => plist_path,
        }
    }
}

/// Pick the sandboxed container when present, else the legacy domain.
///
/// A sandboxed plist that this process cannot write yields
/// `InaccessibleSandboxed`; on systems with integrity protection enabled the
/// invoking executable needs full disk access.
pub fn resolve_safari_target(home: &Path) -> SafariTarget {
    let container = home.join("Library/Containers").join(SAFARI_BUNDLE_ID);
    if container.is_dir() {
        let domain_path = container
            .join("Data/Library/Preferences")
            .join(SAFARI_BUNDLE_ID);
        let plist_path = PathBuf::from(format!("{}.plist", domain_path.display()));
        if !is_writable(&plist_path) {
            tracing::debug!(path = %plist_path.display(), "sandboxed Safari prefs not writable");
            return SafariTarget::InaccessibleSandboxed { plist_path };
        }
        return SafariTarget::Sandboxed {
            domain: domain_path.display().to_string(),
            plist_path,
        };
    }
    SafariTarget::Legacy {
        domain: SAFARI_BUNDLE_ID.to_string(),
        plist_path: home
            .join("Library/Preferences")
            .join(format!("{SAFARI_BUNDLE_ID}.plist")),
    }
}

/// `access(2)` with `W_OK` against the real uid/gid.
fn is_writable(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}
