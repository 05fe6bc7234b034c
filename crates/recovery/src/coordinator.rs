//! Recovery requests and reconstruction.
//!
//! The initiator asks each trustee for their share with
//! [RecoveryCoordinator::initiate_recovery]. Trustees store the
//! request and answer it with
//! [RecoveryCoordinator::answer_recovery_request]; responses are
//! applied at most once per trustee and the secret is rebuilt by
//! [RecoveryCoordinator::perform_recovery] once enough shares
//! have arrived.
use crate::{
    locks::KeyedLocks, BackupConfigurationStore, Error, EventOutcome,
    HeldShareStore, IncomingRecoveryRequest, Notification, Notifier,
    RecoveryProgress, RecoveryRequest, RecoveryResponse, RecoveryStatus,
    Result, SharedIdentity,
};
use futures::future::join_all;
use indexmap::IndexMap;
use keyward_core::{
    constants::MIN_THRESHOLD, Config, EventId, PublicKey, RecoveryRequestId,
    RelaySet, UtcDateTime, VaultId,
};
use keyward_protocol::{
    encode_event, BoxedTransport, InboundEvent, Payload,
    RecoveryRequestPayload, RecoveryResponsePayload,
};
use keyward_shamir::{secrecy::SecretBox, SecretSplitter, ShareRecord};
use keyward_storage::{JsonStore, Namespace, StorageProvider, StoreKey};
use std::sync::Arc;

/// Coordinates recovery requests for initiators and trustees.
pub struct RecoveryCoordinator {
    identity: SharedIdentity,
    store: StorageProvider,
    transport: BoxedTransport,
    configurations: Arc<BackupConfigurationStore>,
    held_shares: Arc<HeldShareStore>,
    notifier: Notifier,
    vault_locks: KeyedLocks<VaultId>,
    request_locks: KeyedLocks<RecoveryRequestId>,
    config: Arc<Config>,
}

impl RecoveryCoordinator {
    /// Create a recovery coordinator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: SharedIdentity,
        store: StorageProvider,
        transport: BoxedTransport,
        configurations: Arc<BackupConfigurationStore>,
        held_shares: Arc<HeldShareStore>,
        notifier: Notifier,
        config: Arc<Config>,
    ) -> Self {
        Self {
            identity,
            store,
            transport,
            configurations,
            held_shares,
            notifier,
            vault_locks: KeyedLocks::new(),
            request_locks: KeyedLocks::new(),
            config,
        }
    }

    fn key(request_id: &RecoveryRequestId) -> Result<StoreKey> {
        Ok(StoreKey::new(Namespace::RecoveryRequest, request_id)?)
    }

    fn incoming_key(request_id: &RecoveryRequestId) -> Result<StoreKey> {
        Ok(StoreKey::new(Namespace::IncomingRecoveryRequest, request_id)?)
    }

    async fn read_required(
        &self,
        request_id: &RecoveryRequestId,
    ) -> Result<RecoveryRequest> {
        self.store
            .read_json(&Self::key(request_id)?)
            .await?
            .ok_or(Error::RecoveryRequestNotFound(*request_id))
    }

    async fn write(&self, request: &RecoveryRequest) -> Result<()> {
        self.store
            .write_json(&Self::key(&request.id)?, request)
            .await?;
        Ok(())
    }

    async fn relay_set(
        &self,
        vault_id: &VaultId,
        relays: Option<RelaySet>,
    ) -> Result<RelaySet> {
        if let Some(relays) = relays {
            if relays.len() > self.config.relay_limit() {
                return Err(Error::InvalidRelaySet(format!(
                    "at most {} relays are allowed",
                    self.config.relay_limit()
                )));
            }
            return Ok(relays);
        }
        if let Some(config) = self.configurations.get(vault_id).await? {
            return Ok(config.relays);
        }
        self.config
            .default_relay_set()
            .ok_or_else(|| Error::InvalidRelaySet("no relays configured".to_owned()))
    }

    /// Ask trustees for their shares of a vault.
    ///
    /// The local identity is the initiator. Response slots are
    /// persisted before anything is sent; the request is marked
    /// as sent when at least one trustee could be reached.
    pub async fn initiate_recovery(
        &self,
        vault_id: VaultId,
        trustees: Vec<PublicKey>,
        threshold: u8,
        expires_at: Option<UtcDateTime>,
        relays: Option<RelaySet>,
    ) -> Result<RecoveryRequest> {
        let total = trustees.len();
        if threshold < MIN_THRESHOLD || threshold as usize > total {
            return Err(Error::ThresholdMismatch {
                expected: total.min(u8::MAX as usize) as u8,
                actual: threshold,
            });
        }
        let initiator = self.identity.public_key();
        let mut responses = IndexMap::new();
        for trustee in trustees {
            if trustee == initiator || responses.contains_key(&trustee) {
                return Err(Error::DuplicateTrustee(trustee));
            }
            responses.insert(trustee, None);
        }
        let relays = self.relay_set(&vault_id, relays).await?;

        let _guard = self.vault_locks.lock(&vault_id).await;
        let existing: Vec<RecoveryRequest> =
            self.store.read_all_json(Namespace::RecoveryRequest).await?;
        if let Some(active) = existing.iter().find(|r| {
            r.vault_id == vault_id && r.initiator == initiator && r.status.is_active()
        }) {
            return Err(Error::DuplicateActiveRequest {
                vault_id,
                request_id: active.id,
            });
        }

        let mut request = RecoveryRequest {
            id: RecoveryRequestId::new_v4(),
            vault_id,
            initiator: initiator.clone(),
            requested_at: UtcDateTime::now(),
            expires_at,
            threshold,
            relays,
            status: RecoveryStatus::Pending,
            responses,
            completed_at: None,
        };
        self.write(&request).await?;

        let payload = Payload::RecoveryRequest(RecoveryRequestPayload {
            request_id: request.id,
            vault_id,
            initiator_public_key: initiator,
            threshold,
            requested_at: request.requested_at,
            expires_at,
            relays: request.relays.clone(),
        });
        let sends = request.responses.keys().map(|trustee| {
            let payload = &payload;
            let relays = &request.relays;
            async move {
                let result = self.send(trustee, relays, payload).await;
                if let Err(e) = &result {
                    tracing::warn!(
                        vault_id = %vault_id,
                        trustee = %trustee.short(),
                        error = %e,
                        "coordinator::request_not_sent");
                }
                result.is_ok()
            }
        });
        let sent = join_all(sends).await.into_iter().filter(|ok| *ok).count();

        if sent > 0 {
            request.status = RecoveryStatus::Sent;
            self.write(&request).await?;
        }

        tracing::debug!(
            vault_id = %vault_id,
            request_id = %request.id,
            threshold = threshold,
            sent = sent,
            total = request.responses.len(),
            "coordinator::initiate");
        Ok(request)
    }

    /// Store a recovery request received by the local trustee.
    ///
    /// Returns `false` when the request is already known.
    pub async fn on_incoming_recovery_request(
        &self,
        request: RecoveryRequestPayload,
        source_event_id: Option<EventId>,
    ) -> Result<bool> {
        let key = Self::incoming_key(&request.request_id)?;
        let _guard = self.request_locks.lock(&request.request_id).await;
        if self
            .store
            .read_json::<IncomingRecoveryRequest>(&key)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        let incoming = IncomingRecoveryRequest {
            request,
            received_at: UtcDateTime::now(),
            source_event_id,
            approved: None,
            answered_at: None,
        };
        self.store.write_json(&key, &incoming).await?;
        self.notifier.notify(Notification::RecoveryRequestReceived {
            request_id: incoming.request.request_id,
            vault_id: incoming.request.vault_id,
            initiator: incoming.request.initiator_public_key.clone(),
        });
        tracing::debug!(
            request_id = %incoming.request.request_id,
            vault_id = %incoming.request.vault_id,
            "coordinator::incoming_request");
        Ok(true)
    }

    /// Apply a recovery request event.
    pub async fn on_recovery_request_event(
        &self,
        event: &InboundEvent,
        payload: &RecoveryRequestPayload,
    ) -> EventOutcome {
        if payload.initiator_public_key != event.sender {
            tracing::warn!(
                event_id = %event.event_id,
                "coordinator::request_sender_mismatch");
            return EventOutcome::Dropped;
        }
        match self
            .on_incoming_recovery_request(payload.clone(), Some(event.event_id.clone()))
            .await
        {
            Ok(true) => EventOutcome::Applied,
            Ok(false) => {
                tracing::debug!(
                    request_id = %payload.request_id,
                    "coordinator::request_duplicate");
                EventOutcome::Duplicate
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "coordinator::request_dropped");
                EventOutcome::Dropped
            }
        }
    }

    /// Recovery requests received by the local trustee.
    pub async fn list_incoming(&self) -> Result<Vec<IncomingRecoveryRequest>> {
        Ok(self
            .store
            .read_all_json(Namespace::IncomingRecoveryRequest)
            .await?)
    }

    /// Answer a received recovery request.
    ///
    /// Approving releases the share held for the vault to the
    /// initiator. A request is answered once.
    pub async fn answer_recovery_request(
        &self,
        request_id: &RecoveryRequestId,
        approved: bool,
    ) -> Result<EventId> {
        let key = Self::incoming_key(request_id)?;
        let _guard = self.request_locks.lock(request_id).await;
        let mut incoming: IncomingRecoveryRequest = self
            .store
            .read_json(&key)
            .await?
            .ok_or(Error::RecoveryRequestNotFound(*request_id))?;
        if incoming.approved.is_some() {
            return Err(Error::RecoveryAlreadyAnswered(*request_id));
        }
        let vault_id = incoming.request.vault_id;

        let share_record = if approved {
            let held = self
                .held_shares
                .get(&vault_id)
                .await?
                .ok_or(Error::NoHeldShare(vault_id))?;
            Some(held.share)
        } else {
            None
        };

        let payload = Payload::RecoveryResponse(RecoveryResponsePayload {
            recovery_request_id: *request_id,
            vault_id,
            responder_public_key: self.identity.public_key(),
            approved,
            share_record,
        });
        let event_id = self
            .send(
                &incoming.request.initiator_public_key,
                &incoming.request.relays,
                &payload,
            )
            .await?;

        incoming.approved = Some(approved);
        incoming.answered_at = Some(UtcDateTime::now());
        self.store.write_json(&key, &incoming).await?;

        tracing::debug!(
            request_id = %request_id,
            vault_id = %vault_id,
            approved = approved,
            "coordinator::answer");
        Ok(event_id)
    }

    /// Record a trustee's response to a recovery request.
    ///
    /// Each trustee answers at most once; later responses and
    /// repeated source events leave the request unchanged.
    /// Responses to cancelled or archived requests are ignored.
    /// An approval must carry a share of the requested vault
    /// created by the initiator.
    pub async fn respond_to_recovery_request(
        &self,
        request_id: &RecoveryRequestId,
        responder: &PublicKey,
        approved: bool,
        share: Option<ShareRecord>,
        source_event_id: Option<EventId>,
    ) -> Result<RecoveryProgress> {
        let (progress, _) = self
            .apply_response(request_id, responder, approved, share, source_event_id)
            .await?;
        Ok(progress)
    }

    async fn apply_response(
        &self,
        request_id: &RecoveryRequestId,
        responder: &PublicKey,
        approved: bool,
        share: Option<ShareRecord>,
        source_event_id: Option<EventId>,
    ) -> Result<(RecoveryProgress, EventOutcome)> {
        let _guard = self.request_locks.lock(request_id).await;
        let mut request = self.read_required(request_id).await?;

        if request.status.is_closed() {
            tracing::debug!(
                request_id = %request_id,
                status = ?request.status,
                "coordinator::response_ignored");
            return Ok((request.progress(), EventOutcome::Dropped));
        }
        if source_event_id
            .as_ref()
            .is_some_and(|id| request.has_source_event(id))
        {
            return Ok((request.progress(), EventOutcome::Duplicate));
        }
        match request.responses.get(responder) {
            None => return Err(Error::UnknownResponder(responder.clone())),
            Some(Some(_)) => {
                tracing::debug!(
                    request_id = %request_id,
                    responder = %responder.short(),
                    "coordinator::response_duplicate");
                return Ok((request.progress(), EventOutcome::Duplicate));
            }
            Some(None) => {}
        }
        if approved {
            let share = share
                .as_ref()
                .ok_or_else(|| Error::ApprovalWithoutShare(responder.clone()))?;
            check_released_share(&request, share)?;
        }

        let response = RecoveryResponse {
            approved,
            responded_at: UtcDateTime::now(),
            share_record: if approved { share } else { None },
            source_event_id,
        };
        request.responses.insert(responder.clone(), Some(response));

        if matches!(request.status, RecoveryStatus::Pending | RecoveryStatus::Sent) {
            request.status = RecoveryStatus::InProgress;
        }
        if request.status == RecoveryStatus::InProgress
            && request.progress().can_recover
        {
            request.status = RecoveryStatus::Completed;
            request.completed_at = Some(UtcDateTime::now());
        }
        self.write(&request).await?;

        let progress = request.progress();
        self.notifier
            .notify(Notification::RecoveryProgress(progress.clone()));
        tracing::debug!(
            request_id = %request_id,
            responder = %responder.short(),
            approved = approved,
            approved_count = progress.approved_count,
            status = ?progress.status,
            "coordinator::response");
        Ok((progress, EventOutcome::Applied))
    }

    /// Apply a recovery response event.
    pub async fn on_recovery_response_event(
        &self,
        event: &InboundEvent,
        payload: &RecoveryResponsePayload,
    ) -> EventOutcome {
        if payload.responder_public_key != event.sender {
            tracing::warn!(
                event_id = %event.event_id,
                "coordinator::response_sender_mismatch");
            return EventOutcome::Dropped;
        }
        let request = match self.get(&payload.recovery_request_id).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                tracing::warn!(
                    request_id = %payload.recovery_request_id,
                    "coordinator::response_unknown_request");
                return EventOutcome::Dropped;
            }
            Err(e) => {
                tracing::warn!(error = %e, "coordinator::response_dropped");
                return EventOutcome::Dropped;
            }
        };
        let vault_matches = request.vault_id == payload.vault_id
            && payload
                .share_record
                .as_ref()
                .map(|share| share.vault_id == request.vault_id)
                .unwrap_or(true);
        if !vault_matches {
            tracing::warn!(
                request_id = %request.id,
                "coordinator::response_vault_mismatch");
            return EventOutcome::Dropped;
        }

        match self
            .apply_response(
                &payload.recovery_request_id,
                &event.sender,
                payload.approved,
                payload.share_record.clone(),
                Some(event.event_id.clone()),
            )
            .await
        {
            Ok((_, outcome)) => outcome,
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "coordinator::response_dropped");
                EventOutcome::Dropped
            }
        }
    }

    /// Recovery request by identifier.
    pub async fn get(
        &self,
        request_id: &RecoveryRequestId,
    ) -> Result<Option<RecoveryRequest>> {
        Ok(self.store.read_json(&Self::key(request_id)?).await?)
    }

    /// All recovery requests initiated on this device.
    pub async fn list(&self) -> Result<Vec<RecoveryRequest>> {
        Ok(self.store.read_all_json(Namespace::RecoveryRequest).await?)
    }

    /// Response counts for a recovery request.
    pub async fn get_recovery_status(
        &self,
        request_id: &RecoveryRequestId,
    ) -> Result<RecoveryProgress> {
        Ok(self.read_required(request_id).await?.progress())
    }

    /// Rebuild the secret from the approved shares.
    pub async fn perform_recovery(
        &self,
        request_id: &RecoveryRequestId,
    ) -> Result<SecretBox<Vec<u8>>> {
        let _guard = self.request_locks.lock(request_id).await;
        let mut request = self.read_required(request_id).await?;
        if request.status.is_closed() {
            return Err(Error::RecoveryClosed(*request_id));
        }
        let shares = request.recoverable_shares().ok_or_else(|| {
            Error::InsufficientApprovals {
                required: request.threshold,
                approved: request.progress().approved_count,
            }
        })?;

        let secret = SecretSplitter::reconstruct(&shares)?;

        if request.status != RecoveryStatus::Completed {
            request.status = RecoveryStatus::Completed;
            request.completed_at = Some(UtcDateTime::now());
            self.write(&request).await?;
            self.notifier
                .notify(Notification::RecoveryProgress(request.progress()));
        }
        tracing::debug!(
            request_id = %request_id,
            vault_id = %request.vault_id,
            "coordinator::perform_recovery");
        Ok(secret)
    }

    /// Cancel a recovery request and discard the shares it
    /// collected.
    pub async fn cancel_recovery_request(
        &self,
        request_id: &RecoveryRequestId,
    ) -> Result<RecoveryRequest> {
        let _guard = self.request_locks.lock(request_id).await;
        let mut request = self.read_required(request_id).await?;
        match request.status {
            RecoveryStatus::Cancelled => return Ok(request),
            RecoveryStatus::Completed | RecoveryStatus::Archived => {
                return Err(Error::RecoveryClosed(*request_id))
            }
            _ => {}
        }
        self.close(&mut request, RecoveryStatus::Cancelled).await?;
        tracing::debug!(request_id = %request_id, "coordinator::cancel");
        Ok(request)
    }

    /// Leave recovery mode, archiving the request and discarding
    /// the shares it collected.
    pub async fn exit_recovery_mode(
        &self,
        request_id: &RecoveryRequestId,
    ) -> Result<RecoveryRequest> {
        let _guard = self.request_locks.lock(request_id).await;
        let mut request = self.read_required(request_id).await?;
        if request.status != RecoveryStatus::Archived {
            self.close(&mut request, RecoveryStatus::Archived).await?;
        }
        tracing::debug!(request_id = %request_id, "coordinator::exit");
        Ok(request)
    }

    async fn close(
        &self,
        request: &mut RecoveryRequest,
        status: RecoveryStatus,
    ) -> Result<()> {
        request.status = status;
        request.purge_shares();
        self.write(request).await?;
        self.notifier
            .notify(Notification::RecoveryProgress(request.progress()));
        Ok(())
    }

    async fn send(
        &self,
        recipient: &PublicKey,
        relays: &RelaySet,
        payload: &Payload,
    ) -> Result<EventId> {
        let envelope = encode_event(&*self.identity, recipient, payload).await?;
        Ok(self.transport.publish(envelope, relays).await?)
    }
}

/// Shares are released to the owner that created them and must
/// belong to the requested vault.
fn check_released_share(request: &RecoveryRequest, share: &ShareRecord) -> Result<()> {
    if share.threshold != request.threshold {
        return Err(Error::ThresholdMismatch {
            expected: request.threshold,
            actual: share.threshold,
        });
    }
    if share.vault_id != request.vault_id {
        return Err(Error::IncompatibleShare("share belongs to another vault"));
    }
    if share.creator != request.initiator {
        return Err(Error::IncompatibleShare("share was created by another owner"));
    }
    Ok(())
}
