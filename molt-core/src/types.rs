//! Small closed domain types shared by every crate in the workspace.

use std::fmt;

/// Which half of the update protocol this process instance plays.
///
/// Resolved once at startup from the role flag and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Long-lived supervisor running the host workload.
    Parent,
    /// Disposable update daemon spawned by the parent.
    Child,
}

impl Role {
    pub fn from_flag(is_child: bool) -> Self {
        if is_child {
            Role::Child
        } else {
            Role::Parent
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Parent => "parent",
            Role::Child => "child",
        };
        f.write_str(s)
    }
}

/// How the replacement engine puts the candidate at the executable path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReplaceMode {
    /// Stream the candidate's bytes into a fresh file at the executable path.
    #[default]
    Copy,
    /// Symlink the executable path to the candidate. The candidate becomes
    /// the backing file and must not be deleted afterwards.
    Link,
}

impl fmt::Display for ReplaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplaceMode::Copy => "copy",
            ReplaceMode::Link => "link",
        };
        f.write_str(s)
    }
}
