//! Camera permission gate

use std::fs::OpenOptions;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Permission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Platform hook that answers camera permission queries
pub trait PermissionProvider: Send {
    /// Current permission without prompting
    fn check(&mut self) -> PermissionStatus;

    /// Ask for permission (may prompt the user)
    fn request(&mut self) -> PermissionStatus;
}

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Unknown,
    Granted,
    Denied,
}

/// Gates pipeline entry on camera access
///
/// Transitions: `Unknown -> Granted | Denied`, `Denied -> Granted` on a later
/// successful request. `Granted` is sticky for the session.
pub struct PermissionGate<P: PermissionProvider> {
    provider: P,
    state: GateState,
}

impl<P: PermissionProvider> PermissionGate<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            state: GateState::Unknown,
        }
    }

    /// Check permission and request it when not yet granted
    pub fn request_if_needed(&mut self) -> PermissionStatus {
        if self.state == GateState::Granted {
            return PermissionStatus::Granted;
        }

        let status = match self.provider.check() {
            PermissionStatus::Granted => PermissionStatus::Granted,
            PermissionStatus::Denied => {
                debug!("Camera permission not held, requesting");
                self.provider.request()
            }
        };

        self.state = match status {
            PermissionStatus::Granted => {
                info!("Camera permission granted");
                GateState::Granted
            }
            PermissionStatus::Denied => {
                warn!("Camera permission denied");
                GateState::Denied
            }
        };
        status
    }

    /// Last decision, if any
    pub fn status(&self) -> Option<PermissionStatus> {
        match self.state {
            GateState::Unknown => None,
            GateState::Granted => Some(PermissionStatus::Granted),
            GateState::Denied => Some(PermissionStatus::Denied),
        }
    }
}

/// Fixed answer, for synthetic cameras and tests
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub PermissionStatus);

impl PermissionProvider for StaticPermission {
    fn check(&mut self) -> PermissionStatus {
        self.0
    }

    fn request(&mut self) -> PermissionStatus {
        self.0
    }
}

/// Access check on a device node
///
/// Linux has no interactive camera prompt, so a request is a second check.
#[derive(Debug, Clone)]
pub struct DeviceNodePermission {
    path: PathBuf,
}

impl DeviceNodePermission {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PermissionProvider for DeviceNodePermission {
    fn check(&mut self) -> PermissionStatus {
        match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(_) => PermissionStatus::Granted,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Device node not accessible");
                PermissionStatus::Denied
            }
        }
    }

    fn request(&mut self) -> PermissionStatus {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedProvider {
        check: PermissionStatus,
        request: PermissionStatus,
        checks: usize,
        requests: usize,
    }

    impl ScriptedProvider {
        fn new(check: PermissionStatus, request: PermissionStatus) -> Self {
            Self {
                check,
                request,
                checks: 0,
                requests: 0,
            }
        }
    }

    impl PermissionProvider for ScriptedProvider {
        fn check(&mut self) -> PermissionStatus {
            self.checks += 1;
            self.check
        }

        fn request(&mut self) -> PermissionStatus {
            self.requests += 1;
            self.request
        }
    }

    #[test]
    fn test_granted_is_noop_on_repeat() {
        let mut gate = PermissionGate::new(ScriptedProvider::new(
            PermissionStatus::Granted,
            PermissionStatus::Denied,
        ));

        assert_eq!(gate.status(), None);
        assert_eq!(gate.request_if_needed(), PermissionStatus::Granted);
        assert_eq!(gate.request_if_needed(), PermissionStatus::Granted);
        assert_eq!(gate.provider.checks, 1);
        assert_eq!(gate.provider.requests, 0);
    }

    #[test]
    fn test_request_after_failed_check() {
        let mut gate = PermissionGate::new(ScriptedProvider::new(
            PermissionStatus::Denied,
            PermissionStatus::Granted,
        ));

        assert_eq!(gate.request_if_needed(), PermissionStatus::Granted);
        assert_eq!(gate.provider.requests, 1);
        assert_eq!(gate.status(), Some(PermissionStatus::Granted));
    }

    #[test]
    fn test_denied() {
        let mut gate = PermissionGate::new(StaticPermission(PermissionStatus::Denied));
        assert_eq!(gate.request_if_needed(), PermissionStatus::Denied);
        assert_eq!(gate.status(), Some(PermissionStatus::Denied));
    }

    #[test]
    fn test_missing_device_node() {
        let mut gate = PermissionGate::new(DeviceNodePermission::new(
            "/nonexistent/object-finder/video9",
        ));
        assert_eq!(gate.request_if_needed(), PermissionStatus::Denied);
    }
}
