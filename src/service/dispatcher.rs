//! Callee-side transaction dispatcher
//!
//! Takes (opcode, request, reply), checks the interface token, decodes the
//! arguments, invokes the service implementation and encodes its results.
//! Holds no per-call state, so one instance serves concurrent transactions.

use std::sync::Arc;
use thiserror::Error;

use super::{Capabilities, MediaPlayerService};
use crate::protocol::{
    schema_for, write_acoustics_reply, Opcode, Parcel, ParcelError, RemoteHandle, Request,
    SchemaDrift, ScratchArrays, StatusCode, INTERFACE_DESCRIPTOR, INTERFACE_TRANSACTION,
    PING_TRANSACTION,
};

/// Upper bound on a declared acoustics capacity
pub const DEFAULT_MAX_ACOUSTICS_ENTRIES: usize = 1024;

/// Why a dispatched transaction failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Decode error: {0}")]
    Decode(#[from] ParcelError),

    #[error("Reply does not match schema: {0}")]
    SchemaDrift(#[from] SchemaDrift),

    #[error("Implementation failed: {0}")]
    Implementation(StatusCode),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Decode(ParcelError::NotEnoughData { .. }) => StatusCode::NotEnoughData,
            DispatchError::Decode(_) => StatusCode::BadValue,
            DispatchError::SchemaDrift(_) => StatusCode::FailedTransaction,
            DispatchError::Implementation(status) => *status,
        }
    }
}

/// Result of handling one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Succeeded,
    /// Interface token missing or for another contract
    Rejected,
    Failed(DispatchError),
    /// Nobody handles this code
    Unsupported,
}

impl TransactionOutcome {
    /// Transaction status reported back to the caller
    pub fn status(&self) -> StatusCode {
        match self {
            TransactionOutcome::Succeeded => StatusCode::Ok,
            TransactionOutcome::Rejected => StatusCode::PermissionDenied,
            TransactionOutcome::Failed(err) => err.status(),
            TransactionOutcome::Unsupported => StatusCode::UnknownTransaction,
        }
    }

    /// Terminal state this outcome corresponds to
    pub fn state(&self) -> TransactionState {
        match self {
            TransactionOutcome::Succeeded => TransactionState::Succeeded,
            TransactionOutcome::Rejected => TransactionState::Rejected,
            TransactionOutcome::Failed(_) | TransactionOutcome::Unsupported => {
                TransactionState::Failed
            }
        }
    }
}

/// Lifecycle of a single transaction; there are no retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    DescriptorChecked,
    Dispatched,
    Succeeded,
    Rejected,
    Failed,
}

fn advance(code: u32, state: &mut TransactionState, next: TransactionState) {
    tracing::trace!("Transaction {}: {:?} -> {:?}", code, state, next);
    *state = next;
}

/// Handler for codes the dispatcher does not own
pub trait FallbackHandler: Send + Sync {
    fn on_transact(&self, code: u32, data: &mut Parcel, reply: &mut Parcel) -> TransactionOutcome;
}

/// Answers the generic meta-transactions, declines everything else
#[derive(Debug, Clone)]
pub struct BaseHandler {
    descriptor: &'static str,
}

impl BaseHandler {
    pub fn new(descriptor: &'static str) -> Self {
        Self { descriptor }
    }
}

impl Default for BaseHandler {
    fn default() -> Self {
        Self::new(INTERFACE_DESCRIPTOR)
    }
}

impl FallbackHandler for BaseHandler {
    fn on_transact(&self, code: u32, _data: &mut Parcel, reply: &mut Parcel) -> TransactionOutcome {
        match code {
            PING_TRANSACTION => TransactionOutcome::Succeeded,
            INTERFACE_TRANSACTION => match reply.write_string16(self.descriptor) {
                Ok(()) => TransactionOutcome::Succeeded,
                Err(e) => TransactionOutcome::Failed(e.into()),
            },
            _ => TransactionOutcome::Unsupported,
        }
    }
}

/// Media service dispatcher
pub struct Dispatcher {
    service: Arc<dyn MediaPlayerService>,
    capabilities: Capabilities,
    fallback: Arc<dyn FallbackHandler>,
    max_acoustics_entries: usize,
}

impl Dispatcher {
    pub fn new(service: Arc<dyn MediaPlayerService>, capabilities: Capabilities) -> Self {
        Self {
            service,
            capabilities,
            fallback: Arc::new(BaseHandler::default()),
            max_acoustics_entries: DEFAULT_MAX_ACOUSTICS_ENTRIES,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackHandler>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_max_acoustics_entries(mut self, max: usize) -> Self {
        self.max_acoustics_entries = max;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether this instance answers `opcode` itself
    pub fn handles(&self, opcode: Opcode) -> bool {
        match opcode {
            Opcode::GetAcousticsData => self.capabilities.acoustics,
            _ => true,
        }
    }

    /// Handle one transaction
    ///
    /// On anything but success the reply is left empty.
    pub fn on_transact(&self, code: u32, data: &mut Parcel, reply: &mut Parcel) -> TransactionOutcome {
        let outcome = self.dispatch(code, data, reply);
        match &outcome {
            TransactionOutcome::Succeeded => {
                tracing::debug!("Transaction {} succeeded ({} reply bytes)", code, reply.data_size());
            }
            TransactionOutcome::Rejected => {
                tracing::warn!("Transaction {} rejected: interface token mismatch", code);
                *reply = Parcel::new();
            }
            TransactionOutcome::Failed(e) => {
                tracing::warn!("Transaction {} failed: {}", code, e);
                *reply = Parcel::new();
            }
            TransactionOutcome::Unsupported => {
                tracing::debug!("Transaction {} not handled", code);
                *reply = Parcel::new();
            }
        }
        outcome
    }

    fn dispatch(&self, code: u32, data: &mut Parcel, reply: &mut Parcel) -> TransactionOutcome {
        if code == PING_TRANSACTION || code == INTERFACE_TRANSACTION {
            return self.fallback.on_transact(code, data, reply);
        }

        let mut state = TransactionState::Idle;
        match data.enforce_interface(INTERFACE_DESCRIPTOR) {
            Ok(true) => advance(code, &mut state, TransactionState::DescriptorChecked),
            Ok(false) | Err(_) => {
                advance(code, &mut state, TransactionState::Rejected);
                return TransactionOutcome::Rejected;
            }
        }

        let Some(opcode) = Opcode::from_code(code).filter(|op| self.handles(*op)) else {
            let outcome = self.fallback.on_transact(code, data, reply);
            advance(code, &mut state, outcome.state());
            return outcome;
        };

        let outcome = match Request::read_args(opcode, data) {
            Ok(request) => {
                advance(code, &mut state, TransactionState::Dispatched);
                tracing::debug!("Dispatching {}", opcode);
                match self.invoke(request, reply) {
                    Ok(status_ok) => match schema_for(opcode).check_reply(reply.written_fields(), status_ok) {
                        Ok(()) => TransactionOutcome::Succeeded,
                        Err(drift) => TransactionOutcome::Failed(drift.into()),
                    },
                    Err(e) => TransactionOutcome::Failed(e),
                }
            }
            Err(e) => TransactionOutcome::Failed(e.into()),
        };
        advance(code, &mut state, outcome.state());
        outcome
    }

    /// Run the implementation and encode its results. Returns whether a
    /// status-bearing reply reported success.
    fn invoke(&self, request: Request, reply: &mut Parcel) -> Result<bool, DispatchError> {
        let service = &self.service;
        match request {
            Request::Create { client, session_id } => {
                reply.write_handle(service.create(client, session_id));
            }
            Request::CreateMediaRecorder { package_name } => {
                reply.write_handle(service.create_media_recorder(&package_name));
            }
            Request::CreateMetadataRetriever => {
                reply.write_handle(service.create_metadata_retriever());
            }
            Request::GetOmx => {
                reply.write_handle(service.get_omx());
            }
            Request::MakeHdcp { create_encryption } => {
                reply.write_handle(service.make_hdcp(create_encryption));
            }
            Request::AddBatteryData { params } => {
                service.add_battery_data(params);
            }
            Request::PullBatteryData => {
                service
                    .pull_battery_data(reply)
                    .map_err(DispatchError::Implementation)?;
            }
            Request::ListenForRemoteDisplay {
                package_name,
                client,
                interface_name,
            } => {
                let display = match interface_name.as_deref() {
                    Some(iface) if !client.is_null() => {
                        service.listen_for_remote_display(&package_name, client, iface)
                    }
                    _ => RemoteHandle::NULL,
                };
                reply.write_handle(display);
            }
            Request::GetCodecList => {
                reply.write_handle(service.get_codec_list());
            }
            Request::GetAcousticsData { capacity } => {
                return self.acoustics(capacity, reply);
            }
        }
        Ok(true)
    }

    fn acoustics(&self, capacity: i32, reply: &mut Parcel) -> Result<bool, DispatchError> {
        let Some(capacity) = usize::try_from(capacity)
            .ok()
            .filter(|n| *n > 0 && *n <= self.max_acoustics_entries)
        else {
            tracing::warn!(
                "Acoustics capacity {} outside 1..={}",
                capacity,
                self.max_acoustics_entries
            );
            write_acoustics_reply(reply, Err(StatusCode::BadValue))?;
            return Ok(false);
        };

        let mut scratch = ScratchArrays::new(capacity);
        let result = {
            let (ids, sessions, categories) = scratch.slices_mut();
            self.service.get_acoustics_data(ids, sessions, categories)
        };

        let outcome = match result {
            Ok(count) => scratch.view(count).ok_or_else(|| {
                tracing::warn!(
                    "Acoustics implementation reported {} entries for capacity {}",
                    count,
                    capacity
                );
                StatusCode::UnknownError
            }),
            // a failure must never read as OK on the wire
            Err(status) if status.to_raw() == StatusCode::OK => {
                tracing::warn!("Acoustics implementation failed with a zero status");
                Err(StatusCode::UnknownError)
            }
            Err(status) => Err(status),
        };
        let status_ok = outcome.is_ok();
        write_acoustics_reply(reply, outcome)?;
        Ok(status_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{read_acoustics_reply, FieldKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Service double that counts every call
    #[derive(Default)]
    struct CountingService {
        calls: AtomicUsize,
        acoustics_count: usize,
        acoustics_error: Option<StatusCode>,
    }

    impl CountingService {
        fn hit(&self) -> RemoteHandle {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            RemoteHandle::new(n as u64 + 100)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MediaPlayerService for CountingService {
        fn create(&self, _client: RemoteHandle, _session_id: i32) -> RemoteHandle {
            self.hit()
        }
        fn create_media_recorder(&self, _package_name: &str) -> RemoteHandle {
            self.hit()
        }
        fn create_metadata_retriever(&self) -> RemoteHandle {
            self.hit()
        }
        fn get_omx(&self) -> RemoteHandle {
            self.hit()
        }
        fn make_hdcp(&self, _create_encryption: bool) -> RemoteHandle {
            self.hit()
        }
        fn add_battery_data(&self, _params: u32) {
            self.hit();
        }
        fn pull_battery_data(&self, reply: &mut Parcel) -> Result<(), StatusCode> {
            self.hit();
            reply.write_i32(0);
            Ok(())
        }
        fn listen_for_remote_display(
            &self,
            _package_name: &str,
            _client: RemoteHandle,
            _interface_name: &str,
        ) -> RemoteHandle {
            self.hit()
        }
        fn get_codec_list(&self) -> RemoteHandle {
            self.hit()
        }
        fn get_acoustics_data(
            &self,
            ids: &mut [i32],
            sessions: &mut [i32],
            categories: &mut [i32],
        ) -> Result<usize, StatusCode> {
            self.hit();
            if let Some(status) = self.acoustics_error {
                return Err(status);
            }
            let count = self.acoustics_count;
            for i in 0..count.min(ids.len()) {
                ids[i] = i as i32 + 1;
                sessions[i] = 10 * (i as i32 + 1);
                categories[i] = 3;
            }
            Ok(count)
        }
    }

    fn dispatcher(service: Arc<CountingService>, capabilities: Capabilities) -> Dispatcher {
        Dispatcher::new(service, capabilities)
    }

    fn sample_request(opcode: Opcode) -> Request {
        match opcode {
            Opcode::Create => Request::Create {
                client: RemoteHandle::new(1),
                session_id: 7,
            },
            Opcode::CreateMediaRecorder => Request::CreateMediaRecorder {
                package_name: "com.example.rec".to_string(),
            },
            Opcode::CreateMetadataRetriever => Request::CreateMetadataRetriever,
            Opcode::GetOmx => Request::GetOmx,
            Opcode::MakeHdcp => Request::MakeHdcp {
                create_encryption: false,
            },
            Opcode::AddBatteryData => Request::AddBatteryData { params: 3 },
            Opcode::PullBatteryData => Request::PullBatteryData,
            Opcode::ListenForRemoteDisplay => Request::ListenForRemoteDisplay {
                package_name: "com.example.cast".to_string(),
                client: RemoteHandle::new(2),
                interface_name: Some("wlan0".to_string()),
            },
            Opcode::GetCodecList => Request::GetCodecList,
            Opcode::GetAcousticsData => Request::GetAcousticsData { capacity: 4 },
        }
    }

    #[test]
    fn test_every_opcode_dispatches() {
        let service = Arc::new(CountingService::default());
        let dispatcher = dispatcher(service.clone(), Capabilities::default());

        for opcode in Opcode::ALL {
            let mut data = sample_request(opcode).encode(INTERFACE_DESCRIPTOR).unwrap();
            let mut reply = Parcel::new();
            let outcome = dispatcher.on_transact(opcode.code(), &mut data, &mut reply);
            assert_eq!(outcome, TransactionOutcome::Succeeded, "{}", opcode);
        }
        assert_eq!(service.calls(), Opcode::ALL.len());
    }

    #[test]
    fn test_wrong_descriptor_rejected_for_every_opcode() {
        let service = Arc::new(CountingService::default());
        let dispatcher = dispatcher(service.clone(), Capabilities::default());

        for opcode in Opcode::ALL {
            let mut data = sample_request(opcode).encode("android.media.IOther").unwrap();
            let mut reply = Parcel::new();
            let outcome = dispatcher.on_transact(opcode.code(), &mut data, &mut reply);

            assert_eq!(outcome, TransactionOutcome::Rejected, "{}", opcode);
            assert_eq!(outcome.status(), StatusCode::PermissionDenied);
            assert_eq!(reply.data_size(), 0);
        }
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_missing_token_rejected() {
        let service = Arc::new(CountingService::default());
        let dispatcher = dispatcher(service.clone(), Capabilities::default());

        let mut data = Parcel::new();
        let mut reply = Parcel::new();
        let outcome = dispatcher.on_transact(Opcode::GetOmx.code(), &mut data, &mut reply);
        assert_eq!(outcome, TransactionOutcome::Rejected);
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_null_display_client_short_circuits() {
        let service = Arc::new(CountingService::default());
        let dispatcher = dispatcher(service.clone(), Capabilities::default());

        let mut data = Parcel::new();
        data.write_interface_token(INTERFACE_DESCRIPTOR).unwrap();
        data.write_string16("com.example.cast").unwrap();
        data.write_handle(RemoteHandle::NULL);
        // interface name deliberately absent

        let mut reply = Parcel::new();
        let outcome =
            dispatcher.on_transact(Opcode::ListenForRemoteDisplay.code(), &mut data, &mut reply);
        assert_eq!(outcome, TransactionOutcome::Succeeded);
        assert_eq!(service.calls(), 0);

        let mut reader = Parcel::from_bytes(reply.as_bytes());
        assert!(reader.read_handle().unwrap().is_null());
    }

    #[test]
    fn test_acoustics_without_capability_is_unsupported() {
        let service = Arc::new(CountingService::default());
        let dispatcher = dispatcher(service.clone(), Capabilities::minimal());

        let mut data = Request::GetAcousticsData { capacity: 5 }
            .encode(INTERFACE_DESCRIPTOR)
            .unwrap();
        let mut reply = Parcel::new();
        let outcome = dispatcher.on_transact(Opcode::GetAcousticsData.code(), &mut data, &mut reply);

        assert_eq!(outcome, TransactionOutcome::Unsupported);
        assert_eq!(outcome.status(), StatusCode::UnknownTransaction);
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_acoustics_truncates_to_count() {
        let service = Arc::new(CountingService {
            acoustics_count: 3,
            ..Default::default()
        });
        let dispatcher = dispatcher(service, Capabilities::default());

        let mut data = Request::GetAcousticsData { capacity: 5 }
            .encode(INTERFACE_DESCRIPTOR)
            .unwrap();
        let mut reply = Parcel::new();
        let outcome = dispatcher.on_transact(Opcode::GetAcousticsData.code(), &mut data, &mut reply);
        assert_eq!(outcome, TransactionOutcome::Succeeded);
        assert_eq!(
            reply.written_fields(),
            &[
                FieldKind::Int32,
                FieldKind::Int32,
                FieldKind::RawInt32s,
                FieldKind::RawInt32s,
                FieldKind::RawInt32s
            ]
        );

        let mut reader = Parcel::from_bytes(reply.as_bytes());
        let snapshot = read_acoustics_reply(&mut reader, 5).unwrap().unwrap();
        assert_eq!(snapshot.ids, vec![1, 2, 3]);
        assert_eq!(snapshot.sessions, vec![10, 20, 30]);
        assert_eq!(reader.data_avail(), 0);
    }

    #[test]
    fn test_acoustics_bad_capacity_skips_implementation() {
        let service = Arc::new(CountingService::default());
        let dispatcher =
            dispatcher(service.clone(), Capabilities::default()).with_max_acoustics_entries(8);

        for capacity in [0, -3, 9] {
            let mut data = Request::GetAcousticsData { capacity }
                .encode(INTERFACE_DESCRIPTOR)
                .unwrap();
            let mut reply = Parcel::new();
            let outcome =
                dispatcher.on_transact(Opcode::GetAcousticsData.code(), &mut data, &mut reply);
            assert_eq!(outcome, TransactionOutcome::Succeeded);

            let mut reader = Parcel::from_bytes(reply.as_bytes());
            assert_eq!(
                read_acoustics_reply(&mut reader, 8).unwrap(),
                Err(StatusCode::BadValue)
            );
        }
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_acoustics_over_report_is_unknown_error() {
        let service = Arc::new(CountingService {
            acoustics_count: 9,
            ..Default::default()
        });
        let dispatcher = dispatcher(service, Capabilities::default());

        let mut data = Request::GetAcousticsData { capacity: 2 }
            .encode(INTERFACE_DESCRIPTOR)
            .unwrap();
        let mut reply = Parcel::new();
        dispatcher.on_transact(Opcode::GetAcousticsData.code(), &mut data, &mut reply);

        let mut reader = Parcel::from_bytes(reply.as_bytes());
        assert_eq!(
            read_acoustics_reply(&mut reader, 2).unwrap(),
            Err(StatusCode::UnknownError)
        );
    }

    #[test]
    fn test_acoustics_zero_failure_status_is_unknown_error() {
        let service = Arc::new(CountingService {
            acoustics_error: Some(StatusCode::Other(0)),
            ..Default::default()
        });
        let dispatcher = dispatcher(service, Capabilities::default());

        let mut data = Request::GetAcousticsData { capacity: 4 }
            .encode(INTERFACE_DESCRIPTOR)
            .unwrap();
        let mut reply = Parcel::new();
        let outcome = dispatcher.on_transact(Opcode::GetAcousticsData.code(), &mut data, &mut reply);
        assert_eq!(outcome, TransactionOutcome::Succeeded);
        assert_eq!(reply.data_size(), 4);

        let mut reader = Parcel::from_bytes(reply.as_bytes());
        assert_eq!(
            read_acoustics_reply(&mut reader, 4).unwrap(),
            Err(StatusCode::UnknownError)
        );
    }

    /// Service that leaves acoustics to the trait default
    struct HandlesOnly;

    impl MediaPlayerService for HandlesOnly {
        fn create(&self, _client: RemoteHandle, _session_id: i32) -> RemoteHandle {
            RemoteHandle::NULL
        }
        fn create_media_recorder(&self, _package_name: &str) -> RemoteHandle {
            RemoteHandle::NULL
        }
        fn create_metadata_retriever(&self) -> RemoteHandle {
            RemoteHandle::NULL
        }
        fn get_omx(&self) -> RemoteHandle {
            RemoteHandle::NULL
        }
        fn make_hdcp(&self, _create_encryption: bool) -> RemoteHandle {
            RemoteHandle::NULL
        }
        fn add_battery_data(&self, _params: u32) {}
        fn pull_battery_data(&self, _reply: &mut Parcel) -> Result<(), StatusCode> {
            Ok(())
        }
        fn listen_for_remote_display(
            &self,
            _package_name: &str,
            _client: RemoteHandle,
            _interface_name: &str,
        ) -> RemoteHandle {
            RemoteHandle::NULL
        }
        fn get_codec_list(&self) -> RemoteHandle {
            RemoteHandle::NULL
        }
    }

    #[test]
    fn test_acoustics_implementation_failure_carries_status() {
        let dispatcher = Dispatcher::new(Arc::new(HandlesOnly), Capabilities::default());

        let mut data = Request::GetAcousticsData { capacity: 3 }
            .encode(INTERFACE_DESCRIPTOR)
            .unwrap();
        let mut reply = Parcel::new();
        let outcome = dispatcher.on_transact(Opcode::GetAcousticsData.code(), &mut data, &mut reply);
        assert_eq!(outcome, TransactionOutcome::Succeeded);
        assert_eq!(reply.written_fields(), &[FieldKind::Int32]);

        let mut reader = Parcel::from_bytes(reply.as_bytes());
        assert_eq!(
            read_acoustics_reply(&mut reader, 3).unwrap(),
            Err(StatusCode::InvalidOperation)
        );
        assert_eq!(reader.data_avail(), 0);
    }

    #[test]
    fn test_truncated_arguments_fail_with_empty_reply() {
        let service = Arc::new(CountingService::default());
        let dispatcher = dispatcher(service.clone(), Capabilities::default());

        let mut data = Parcel::new();
        data.write_interface_token(INTERFACE_DESCRIPTOR).unwrap();
        data.write_handle(RemoteHandle::new(4));
        // session id missing

        let mut reply = Parcel::new();
        let outcome = dispatcher.on_transact(Opcode::Create.code(), &mut data, &mut reply);
        assert!(matches!(outcome, TransactionOutcome::Failed(DispatchError::Decode(_))));
        assert_eq!(outcome.status(), StatusCode::NotEnoughData);
        assert_eq!(reply.data_size(), 0);
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_unknown_code_goes_to_fallback() {
        let service = Arc::new(CountingService::default());
        let dispatcher = dispatcher(service, Capabilities::default());

        let mut data = Parcel::new();
        data.write_interface_token(INTERFACE_DESCRIPTOR).unwrap();
        let mut reply = Parcel::new();
        let outcome = dispatcher.on_transact(77, &mut data, &mut reply);
        assert_eq!(outcome, TransactionOutcome::Unsupported);
        assert_eq!(outcome.state(), TransactionState::Failed);
    }

    #[test]
    fn test_meta_transactions() {
        let service = Arc::new(CountingService::default());
        let dispatcher = dispatcher(service, Capabilities::default());

        let mut reply = Parcel::new();
        let outcome = dispatcher.on_transact(PING_TRANSACTION, &mut Parcel::new(), &mut reply);
        assert_eq!(outcome, TransactionOutcome::Succeeded);

        let mut reply = Parcel::new();
        let outcome = dispatcher.on_transact(INTERFACE_TRANSACTION, &mut Parcel::new(), &mut reply);
        assert_eq!(outcome, TransactionOutcome::Succeeded);
        let mut reader = Parcel::from_bytes(reply.as_bytes());
        assert_eq!(reader.read_string16().unwrap(), INTERFACE_DESCRIPTOR);
    }

    #[test]
    fn test_concurrent_transactions() {
        let service = Arc::new(CountingService::default());
        let dispatcher = dispatcher(service.clone(), Capabilities::default());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        let mut data = Request::GetOmx.encode(INTERFACE_DESCRIPTOR).unwrap();
                        let mut reply = Parcel::new();
                        let outcome =
                            dispatcher.on_transact(Opcode::GetOmx.code(), &mut data, &mut reply);
                        assert_eq!(outcome, TransactionOutcome::Succeeded);
                    }
                });
            }
        });
        assert_eq!(service.calls(), 400);
    }
}
