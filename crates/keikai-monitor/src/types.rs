//! Raw package events and the consumer interface.

use std::fmt;

/// Platform package broadcast kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackageAction {
    PackageAdded,
    PackageRemoved,
    PackageChanged,
    PackageReplaced,
    ExternalAvailable,
    ExternalUnavailable,
    Suspended,
    Unsuspended,
    /// Anything else the platform sent.
    Unknown(String),
}

/// What a consumer is told.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Appeared,
    Disappeared,
    Modified,
}

impl PackageAction {
    /// `None` for unknown actions.
    pub fn kind(&self) -> Option<ChangeKind> {
        match self {
            PackageAction::PackageAdded
            | PackageAction::ExternalAvailable
            | PackageAction::Unsuspended => Some(ChangeKind::Appeared),
            PackageAction::PackageRemoved
            | PackageAction::ExternalUnavailable
            | PackageAction::Suspended => Some(ChangeKind::Disappeared),
            PackageAction::PackageChanged | PackageAction::PackageReplaced => {
                Some(ChangeKind::Modified)
            }
            PackageAction::Unknown(_) => None,
        }
    }
}

impl fmt::Display for PackageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageAction::Unknown(name) => write!(f, "unknown ({name})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// One broadcast, possibly naming several packages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEvent {
    pub action: PackageAction,
    pub packages: Vec<String>,
}

impl RawEvent {
    pub fn new(action: PackageAction, packages: Vec<String>) -> Self {
        Self { action, packages }
    }

    pub fn single(action: PackageAction, package: impl Into<String>) -> Self {
        Self::new(action, vec![package.into()])
    }
}

/// Receives reconciled package changes. Called from whichever thread drains
/// the reconciler, one event at a time.
pub trait PackageChangeConsumer: Send + Sync {
    fn on_appeared(&self, package: &str);

    fn on_disappeared(&self, package: &str);

    /// Defaults to a removal followed by a re-add.
    fn on_modified(&self, package: &str) {
        self.on_disappeared(package);
        self.on_appeared(package);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_map_to_change_kinds() {
        assert_eq!(PackageAction::Unsuspended.kind(), Some(ChangeKind::Appeared));
        assert_eq!(
            PackageAction::ExternalUnavailable.kind(),
            Some(ChangeKind::Disappeared)
        );
        assert_eq!(PackageAction::PackageReplaced.kind(), Some(ChangeKind::Modified));
        assert_eq!(PackageAction::Unknown("QUERY".into()).kind(), None);
    }
}
