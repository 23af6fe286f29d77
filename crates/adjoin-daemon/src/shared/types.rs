pub use adjoin_core::interpretation::{DomainMembership, JoinVerdict, RenameVerdict};
pub use adjoin_core::netdom::ShellCommand;
pub use adjoin_core::{
    AdCredentials, CommandResult, Disposition, InstanceDescriptor, JoinOutcome, JoinRequest,
    LifecycleState, OutputLine, Platform,
};

/// Local account used to open the remote session when none is configured.
pub const DEFAULT_ADMIN_USER: &str = "Administrator";

/// Where the in-session restart and the control-plane reboot are issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootChannel {
    Remote,
    ControlPlane,
}

impl RebootChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            RebootChannel::Remote => "remote",
            RebootChannel::ControlPlane => "control_plane",
        }
    }
}

/// Why a remote command batch was run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPurpose {
    Discovery,
    DomainState,
    Join,
    Rename,
    Reboot,
}

impl CommandPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandPurpose::Discovery => "discovery",
            CommandPurpose::DomainState => "domain_state",
            CommandPurpose::Join => "join",
            CommandPurpose::Rename => "rename",
            CommandPurpose::Reboot => "reboot",
        }
    }
}
