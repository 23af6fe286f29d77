pub mod domain_join;
pub mod instance_directory;
pub mod notification;
pub mod observability;
pub mod remote_shell;
