use crate::features::instance_directory::repo::{Instance, InstanceDirectory};
use crate::features::notification::repo::NotificationSink;
use crate::features::observability::service::ObservabilityService;
use crate::features::remote_shell::repo::{RemoteCommandChannel, RemoteSession};
use crate::shared::error::DaemonResult;
use crate::shared::types::{
    AdCredentials, CommandPurpose, CommandResult, DomainMembership, JoinOutcome, JoinRequest,
    JoinVerdict, RebootChannel, RenameVerdict, ShellCommand, DEFAULT_ADMIN_USER,
};
use adjoin_core::{interpretation, netdom};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Drives one domain-join request to a single outcome.
///
/// Decides between skipping, joining and renaming, runs the NETDOM commands over
/// one remote session, and reboots the instance whenever the machine's identity
/// may have changed. Expected failures come back as retryable outcomes; only
/// collaborator faults are returned as errors.
pub struct DomainJoinService {
    directory: Arc<dyn InstanceDirectory>,
    channel: Arc<dyn RemoteCommandChannel>,
    sink: Arc<dyn NotificationSink>,
    credentials: AdCredentials,
    admin_user: String,
    metrics: ObservabilityService,
}

impl DomainJoinService {
    pub fn new(
        directory: Arc<dyn InstanceDirectory>,
        channel: Arc<dyn RemoteCommandChannel>,
        sink: Arc<dyn NotificationSink>,
        credentials: AdCredentials,
        metrics: ObservabilityService,
    ) -> Self {
        Self {
            directory,
            channel,
            sink,
            credentials,
            admin_user: DEFAULT_ADMIN_USER.to_string(),
            metrics,
        }
    }

    pub fn with_admin_user(mut self, admin_user: impl Into<String>) -> Self {
        self.admin_user = admin_user.into();
        self
    }

    pub async fn handle(&self, request: &JoinRequest) -> DaemonResult<JoinOutcome> {
        let instance = match Instance::resolve(self.directory.clone(), request.instance_id())
            .await?
        {
            Some(instance) if !instance.lifecycle_state().is_terminated() => instance,
            Some(_) | None => {
                info!("Instance is missing or terminated; sending request to clean up");
                self.sink.publish_error(request).await?;
                return Ok(JoinOutcome::ResolutionFailed);
            }
        };

        if !instance.platform().is_windows() {
            info!("Received request for a non-Windows instance; forwarding");
            self.sink.publish(request).await?;
            return Ok(JoinOutcome::ForwardedNonWindows);
        }

        let mut session = self
            .channel
            .open(
                request.private_ip(),
                &self.admin_user,
                request.windows_admin_password(),
            )
            .await?;

        let hostname = self.discover_hostname(session.as_mut()).await?;
        if interpretation::hostname_matches(hostname.as_deref(), request.instance_name()) {
            self.join_domain(request, &instance, session.as_mut()).await
        } else {
            info!(
                current = hostname.as_deref().unwrap_or("<none>"),
                desired = %request.instance_name(),
                "Hostname does not match; renaming before joining"
            );
            let membership = self.domain_membership(session.as_mut()).await?;
            self.rename_instance(request, &instance, session.as_mut(), membership)
                .await
        }
    }

    /// First non-blank line printed by `hostname`.
    pub async fn discover_hostname(
        &self,
        session: &mut dyn RemoteSession,
    ) -> DaemonResult<Option<String>> {
        info!("Getting current hostname");
        let output = self
            .run(session, CommandPurpose::Discovery, netdom::hostname())
            .await?;
        let hostname = interpretation::discovered_hostname(&output);
        if hostname.is_none() {
            warn!("Hostname discovery produced no output");
        }
        Ok(hostname)
    }

    pub async fn domain_membership(
        &self,
        session: &mut dyn RemoteSession,
    ) -> DaemonResult<DomainMembership> {
        info!("Getting current domain state");
        let output = self
            .run(session, CommandPurpose::DomainState, netdom::verify_domain())
            .await?;
        Ok(interpretation::domain_membership(&output))
    }

    pub async fn join_domain(
        &self,
        request: &JoinRequest,
        instance: &Instance,
        session: &mut dyn RemoteSession,
    ) -> DaemonResult<JoinOutcome> {
        let domain = request.domain();
        let command = netdom::join_domain(domain, request.ad_ou(), &self.credentials);
        info!(command = %command, "Joining machine to domain");

        let output = self.run(session, CommandPurpose::Join, command).await?;
        match interpretation::join_verdict(&output) {
            JoinVerdict::AlreadyJoined => {
                info!(%domain, "Instance already joined to domain");
                let note = format!("after confirming membership of domain {domain}");
                self.instance_reboot(instance, session, Some(&note)).await;
                self.sink.publish(request).await?;
                Ok(JoinOutcome::AlreadyJoined)
            }
            JoinVerdict::Joined => {
                let note = format!("after joining to domain {domain}");
                self.instance_reboot(instance, session, Some(&note)).await;
                info!(%domain, "Joining instance to domain succeeded");
                self.sink.publish(request).await?;
                Ok(JoinOutcome::Joined)
            }
            JoinVerdict::Failed => {
                let note = format!("after joining to domain failed with: {}", output.joined(","));
                self.instance_reboot(instance, session, Some(&note)).await;
                error!(%domain, "Joining instance to domain failed");
                Ok(JoinOutcome::JoinFailed)
            }
        }
    }

    /// Rename to the requested name and reboot. Never final: the join is left
    /// to the next delivery, once the new name is live.
    pub async fn rename_instance(
        &self,
        request: &JoinRequest,
        instance: &Instance,
        session: &mut dyn RemoteSession,
        membership: DomainMembership,
    ) -> DaemonResult<JoinOutcome> {
        let name = request.instance_name();
        let credentials = membership.is_member().then_some(&self.credentials);
        let command = netdom::rename_computer(name, credentials);
        info!(command = %command, member = membership.is_member(), "Renaming machine");

        let output = self.run(session, CommandPurpose::Rename, command).await?;
        let note = format!("after renaming instance {} to {name}", request.instance_id());
        match interpretation::rename_verdict(&output) {
            RenameVerdict::Renamed => {
                self.instance_reboot(instance, session, Some(&note)).await;
                warn!(%name, "Rebooted after renaming instance; awaiting redelivery");
                Ok(JoinOutcome::RenamedAwaitingRetry)
            }
            RenameVerdict::Failed => {
                let note = format!("{note} failed");
                self.instance_reboot(instance, session, Some(&note)).await;
                error!(%name, "Renaming instance failed; awaiting redelivery");
                Ok(JoinOutcome::RenameFailed)
            }
        }
    }

    /// Restart from inside the session, then reboot through the control plane
    /// in case the first one never lands. Both are best-effort.
    pub async fn instance_reboot(
        &self,
        instance: &Instance,
        session: &mut dyn RemoteSession,
        note: Option<&str>,
    ) {
        let message = netdom::reboot_message(instance.id(), note);

        info!("{message} via remote shell");
        let remote = self
            .run(session, CommandPurpose::Reboot, netdom::restart(&message))
            .await;
        if let Err(error) = &remote {
            warn!(error = %error, "In-session restart failed");
        }
        self.metrics
            .record_reboot(RebootChannel::Remote, remote.is_ok());

        info!("{message} via control plane");
        let control_plane = instance.reboot().await;
        if let Err(error) = &control_plane {
            warn!(error = %error, "Control-plane reboot failed");
        }
        self.metrics
            .record_reboot(RebootChannel::ControlPlane, control_plane.is_ok());
    }

    async fn run(
        &self,
        session: &mut dyn RemoteSession,
        purpose: CommandPurpose,
        command: ShellCommand,
    ) -> DaemonResult<CommandResult> {
        self.metrics.record_remote_command(purpose);
        let output = session.run(std::slice::from_ref(&command)).await?;
        for line in output.lines() {
            info!(host = %line.host, purpose = purpose.as_str(), "{}", line.line);
        }
        Ok(output)
    }
}
