//! Caller-side proxy
//!
//! Each method builds a request message, checks it against the schema
//! table, hands it to the transport and decodes the reply. Transport
//! failures come back unchanged; nothing is retried.

use thiserror::Error;

use crate::network::{Transport, TransportError};
use crate::protocol::{
    read_acoustics_reply, schema_for, AcousticsSnapshot, Opcode, ParallelArrayBlock, Parcel,
    ParcelError, RemoteHandle, Request, SchemaDrift, StatusCode, INTERFACE_DESCRIPTOR,
    INTERFACE_TRANSACTION, PING_TRANSACTION,
};

/// Proxy call failures
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed reply: {0}")]
    Decode(#[from] ParcelError),

    #[error("Request does not match schema: {0}")]
    SchemaDrift(#[from] SchemaDrift),

    #[error("Transaction rejected: interface token mismatch")]
    Rejected,

    #[error("{0} not supported by the service")]
    Unsupported(Opcode),

    #[error("Service returned {0}")]
    Status(StatusCode),
}

pub type ProxyResult<T> = Result<T, ProxyError>;

/// Remote media service, reached through a transport
#[derive(Debug)]
pub struct MediaPlayerServiceProxy<T> {
    transport: T,
}

impl<T: Transport> MediaPlayerServiceProxy<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Encode, send and wait; returns the reply of a successful transaction
    fn transact(&self, request: &Request) -> ProxyResult<Parcel> {
        let opcode = request.opcode();
        let data = request.encode(INTERFACE_DESCRIPTOR)?;
        schema_for(opcode).check_request(data.written_fields())?;

        tracing::debug!("Sending {} ({} bytes)", opcode, data.data_size());
        let reply = self.transport.transact(opcode.code(), &data, 0)?;

        match reply.status {
            StatusCode::Ok => Ok(reply.parcel),
            StatusCode::PermissionDenied => Err(ProxyError::Rejected),
            StatusCode::UnknownTransaction => Err(ProxyError::Unsupported(opcode)),
            status => Err(ProxyError::Status(status)),
        }
    }

    fn transact_for_handle(&self, request: &Request) -> ProxyResult<RemoteHandle> {
        let mut reply = self.transact(request)?;
        Ok(reply.read_handle()?)
    }

    pub fn create(&self, client: RemoteHandle, session_id: i32) -> ProxyResult<RemoteHandle> {
        self.transact_for_handle(&Request::Create { client, session_id })
    }

    pub fn create_media_recorder(&self, package_name: &str) -> ProxyResult<RemoteHandle> {
        self.transact_for_handle(&Request::CreateMediaRecorder {
            package_name: package_name.to_string(),
        })
    }

    pub fn create_metadata_retriever(&self) -> ProxyResult<RemoteHandle> {
        self.transact_for_handle(&Request::CreateMetadataRetriever)
    }

    pub fn get_omx(&self) -> ProxyResult<RemoteHandle> {
        self.transact_for_handle(&Request::GetOmx)
    }

    pub fn make_hdcp(&self, create_encryption: bool) -> ProxyResult<RemoteHandle> {
        self.transact_for_handle(&Request::MakeHdcp { create_encryption })
    }

    pub fn add_battery_data(&self, params: u32) -> ProxyResult<()> {
        self.transact(&Request::AddBatteryData { params })?;
        Ok(())
    }

    /// Service-defined battery payload, positioned at its start
    pub fn pull_battery_data(&self) -> ProxyResult<Parcel> {
        self.transact(&Request::PullBatteryData)
    }

    /// A null `client` yields a null display handle
    pub fn listen_for_remote_display(
        &self,
        package_name: &str,
        client: RemoteHandle,
        interface_name: &str,
    ) -> ProxyResult<RemoteHandle> {
        self.transact_for_handle(&Request::ListenForRemoteDisplay {
            package_name: package_name.to_string(),
            client,
            interface_name: Some(interface_name.to_string()),
        })
    }

    pub fn get_codec_list(&self) -> ProxyResult<RemoteHandle> {
        self.transact_for_handle(&Request::GetCodecList)
    }

    /// Fetch the acoustics snapshot into the caller's block
    ///
    /// The block is checked before the transport is touched. On success
    /// exactly `block.count()` leading entries of each output are written;
    /// on any failure none are.
    pub fn get_acoustics_data(&self, block: &mut ParallelArrayBlock<'_>) -> ProxyResult<()> {
        let capacity = block.validate().map_err(ProxyError::InvalidArgument)?;

        let mut reply = self.transact(&Request::GetAcousticsData {
            capacity: block.capacity,
        })?;

        match read_acoustics_reply(&mut reply, capacity)? {
            Ok(snapshot) => {
                block.fill(&snapshot);
                Ok(())
            }
            Err(status) => Err(ProxyError::Status(status)),
        }
    }

    /// Fetch up to `capacity` acoustics entries into owned arrays
    pub fn acoustics_snapshot(&self, capacity: usize) -> ProxyResult<AcousticsSnapshot> {
        let declared =
            i32::try_from(capacity).map_err(|_| ProxyError::InvalidArgument("capacity too large"))?;

        let mut ids = vec![0; capacity];
        let mut sessions = vec![0; capacity];
        let mut categories = vec![0; capacity];
        let count = {
            let mut block = ParallelArrayBlock::new(
                declared,
                Some(ids.as_mut_slice()),
                Some(sessions.as_mut_slice()),
                Some(categories.as_mut_slice()),
            );
            self.get_acoustics_data(&mut block)?;
            block.count()
        };

        ids.truncate(count);
        sessions.truncate(count);
        categories.truncate(count);
        Ok(AcousticsSnapshot {
            ids,
            sessions,
            categories,
        })
    }

    /// Liveness check
    pub fn ping(&self) -> ProxyResult<()> {
        let reply = self.transport.transact(PING_TRANSACTION, &Parcel::new(), 0)?;
        match reply.status {
            StatusCode::Ok => Ok(()),
            status => Err(ProxyError::Status(status)),
        }
    }

    /// Descriptor of the contract the remote side speaks
    pub fn interface_descriptor(&self) -> ProxyResult<String> {
        let mut reply = self.transport.transact(INTERFACE_TRANSACTION, &Parcel::new(), 0)?;
        match reply.status {
            StatusCode::Ok => Ok(reply.parcel.read_string16()?),
            status => Err(ProxyError::Status(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{LocalTransport, RawReply, TransportResult};
    use crate::service::{Capabilities, Dispatcher, LocalMediaService, MediaPlayerService};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn setup(capabilities: Capabilities) -> (Arc<LocalMediaService>, MediaPlayerServiceProxy<LocalTransport>) {
        let service = Arc::new(LocalMediaService::default());
        let dispatcher = Arc::new(Dispatcher::new(service.clone(), capabilities));
        let proxy = MediaPlayerServiceProxy::new(LocalTransport::new(dispatcher));
        (service, proxy)
    }

    /// Transport that fails or answers with a canned reply, counting calls
    struct ScriptedTransport {
        calls: AtomicUsize,
        reply: Option<Parcel>,
    }

    impl Transport for ScriptedTransport {
        fn transact(&self, _code: u32, _data: &Parcel, _flags: u32) -> TransportResult<RawReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(parcel) => Ok(RawReply {
                    status: StatusCode::Ok,
                    parcel: parcel.clone(),
                }),
                None => Err(TransportError::Closed),
            }
        }
    }

    #[test]
    fn test_every_operation_end_to_end() {
        let (service, proxy) = setup(Capabilities::default());

        let player = proxy.create(RemoteHandle::new(500), 42).unwrap();
        let recorder = proxy.create_media_recorder("com.example.rec").unwrap();
        let retriever = proxy.create_metadata_retriever().unwrap();
        let omx = proxy.get_omx().unwrap();
        let hdcp = proxy.make_hdcp(true).unwrap();
        let display = proxy
            .listen_for_remote_display("com.example.cast", RemoteHandle::new(501), "wlan0")
            .unwrap();
        let codecs = proxy.get_codec_list().unwrap();

        for handle in [player, recorder, retriever, omx, hdcp, display, codecs] {
            assert!(service.registry().get(handle).is_some(), "{} not registered", handle);
        }
        assert_eq!(proxy.get_omx().unwrap(), omx);

        proxy.add_battery_data(0x10).unwrap();
        let mut battery = proxy.pull_battery_data().unwrap();
        assert_eq!(battery.read_i32().unwrap(), 1);
        assert_eq!(battery.read_u32().unwrap(), 0x10);
    }

    #[test]
    fn test_null_display_client_returns_null() {
        let (service, proxy) = setup(Capabilities::default());
        let display = proxy
            .listen_for_remote_display("com.example.cast", RemoteHandle::NULL, "wlan0")
            .unwrap();
        assert!(display.is_null());
        assert!(service.registry().is_empty());
    }

    #[test]
    fn test_zero_capacity_never_reaches_transport() {
        let (_service, proxy) = setup(Capabilities::default());
        let mut ids = [0; 4];
        let mut sessions = [0; 4];
        let mut categories = [0; 4];
        let mut block = ParallelArrayBlock::new(
            0,
            Some(&mut ids[..]),
            Some(&mut sessions[..]),
            Some(&mut categories[..]),
        );

        let err = proxy.get_acoustics_data(&mut block).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidArgument(_)));
        assert_eq!(proxy.transport().transactions(), 0);
    }

    #[test]
    fn test_missing_output_never_reaches_transport() {
        let (_service, proxy) = setup(Capabilities::default());
        let mut ids = [0; 4];
        let mut categories = [0; 4];
        let mut block =
            ParallelArrayBlock::new(4, Some(&mut ids[..]), None, Some(&mut categories[..]));

        let err = proxy.get_acoustics_data(&mut block).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidArgument(_)));
        assert_eq!(proxy.transport().transactions(), 0);
    }

    #[test]
    fn test_acoustics_fills_count_and_leaves_tail() {
        let (service, proxy) = setup(Capabilities::default());
        for session in [11, 12, 13] {
            service.create(RemoteHandle::new(1), session);
        }

        let mut ids = [-1; 5];
        let mut sessions = [-1; 5];
        let mut categories = [-1; 5];
        let mut block = ParallelArrayBlock::over(&mut ids, &mut sessions, &mut categories);
        proxy.get_acoustics_data(&mut block).unwrap();
        assert_eq!(block.capacity, 5);
        assert_eq!(block.count(), 3);
        drop(block);

        assert_eq!(sessions, [11, 12, 13, -1, -1]);
        assert_eq!(&categories[3..], &[-1, -1]);
        assert_eq!(&ids[3..], &[-1, -1]);
        assert!(ids[..3].iter().all(|id| *id > 0));
    }

    #[test]
    fn test_acoustics_snapshot_truncates() {
        let (service, proxy) = setup(Capabilities::default());
        service.create(RemoteHandle::new(1), 77);

        let snapshot = proxy.acoustics_snapshot(8).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.sessions, vec![77]);
        assert!(matches!(
            proxy.acoustics_snapshot(0),
            Err(ProxyError::InvalidArgument(_))
        ));
    }

    /// Forwards everything but acoustics, which keeps the trait default
    struct WithoutAcoustics(LocalMediaService);

    impl MediaPlayerService for WithoutAcoustics {
        fn create(&self, client: RemoteHandle, session_id: i32) -> RemoteHandle {
            self.0.create(client, session_id)
        }
        fn create_media_recorder(&self, package_name: &str) -> RemoteHandle {
            self.0.create_media_recorder(package_name)
        }
        fn create_metadata_retriever(&self) -> RemoteHandle {
            self.0.create_metadata_retriever()
        }
        fn get_omx(&self) -> RemoteHandle {
            self.0.get_omx()
        }
        fn make_hdcp(&self, create_encryption: bool) -> RemoteHandle {
            self.0.make_hdcp(create_encryption)
        }
        fn add_battery_data(&self, params: u32) {
            self.0.add_battery_data(params)
        }
        fn pull_battery_data(&self, reply: &mut Parcel) -> Result<(), StatusCode> {
            self.0.pull_battery_data(reply)
        }
        fn listen_for_remote_display(
            &self,
            package_name: &str,
            client: RemoteHandle,
            interface_name: &str,
        ) -> RemoteHandle {
            self.0
                .listen_for_remote_display(package_name, client, interface_name)
        }
        fn get_codec_list(&self) -> RemoteHandle {
            self.0.get_codec_list()
        }
    }

    #[test]
    fn test_acoustics_implementation_failure_leaves_buffers() {
        let service = WithoutAcoustics(LocalMediaService::default());
        service.create(RemoteHandle::new(1), 5);
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(service), Capabilities::default()));
        let proxy = MediaPlayerServiceProxy::new(LocalTransport::new(dispatcher));

        let mut ids = [-1; 4];
        let mut sessions = [-1; 4];
        let mut categories = [-1; 4];
        let mut block = ParallelArrayBlock::over(&mut ids, &mut sessions, &mut categories);
        let err = proxy.get_acoustics_data(&mut block).unwrap_err();
        assert!(matches!(err, ProxyError::Status(StatusCode::InvalidOperation)));
        assert_eq!(block.count(), 0);
        drop(block);

        assert_eq!(ids, [-1; 4]);
        assert_eq!(sessions, [-1; 4]);
        assert_eq!(categories, [-1; 4]);
        assert_eq!(proxy.transport().transactions(), 1);
    }

    #[test]
    fn test_acoustics_capability_absent() {
        let (_service, proxy) = setup(Capabilities::minimal());
        let err = proxy.acoustics_snapshot(5).unwrap_err();
        assert!(matches!(err, ProxyError::Unsupported(Opcode::GetAcousticsData)));
    }

    #[test]
    fn test_acoustics_capacity_above_service_limit() {
        let service = Arc::new(LocalMediaService::default());
        let dispatcher = Arc::new(
            Dispatcher::new(service, Capabilities::default()).with_max_acoustics_entries(4),
        );
        let proxy = MediaPlayerServiceProxy::new(LocalTransport::new(dispatcher));

        let err = proxy.acoustics_snapshot(5).unwrap_err();
        assert!(matches!(err, ProxyError::Status(StatusCode::BadValue)));
    }

    #[test]
    fn test_corrupt_count_leaves_buffers_untouched() {
        let mut reply = Parcel::new();
        reply.write_i32(StatusCode::OK);
        reply.write_i32(3);
        reply.write_raw_i32s(&[9, 9, 9]);
        // sessions and categories missing

        let proxy = MediaPlayerServiceProxy::new(ScriptedTransport {
            calls: AtomicUsize::new(0),
            reply: Some(Parcel::from_bytes(reply.as_bytes())),
        });

        let mut ids = [-1; 3];
        let mut sessions = [-1; 3];
        let mut categories = [-1; 3];
        let mut block = ParallelArrayBlock::over(&mut ids, &mut sessions, &mut categories);
        let err = proxy.get_acoustics_data(&mut block).unwrap_err();
        assert!(matches!(err, ProxyError::Decode(ParcelError::NotEnoughData { .. })));
        assert_eq!(block.count(), 0);
        drop(block);
        assert_eq!(ids, [-1; 3]);
    }

    #[test]
    fn test_transport_failure_is_propagated() {
        let proxy = MediaPlayerServiceProxy::new(ScriptedTransport {
            calls: AtomicUsize::new(0),
            reply: None,
        });
        let err = proxy.get_omx().unwrap_err();
        assert!(matches!(err, ProxyError::Transport(TransportError::Closed)));
        assert_eq!(proxy.transport().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejection_is_idempotent() {
        let (service, proxy) = setup(Capabilities::default());
        service.create(RemoteHandle::new(1), 1);
        let before = service.registry().len();

        let mut data = Parcel::new();
        data.write_interface_token("android.media.IMediaRecorder").unwrap();
        data.write_handle(RemoteHandle::new(2));
        data.write_i32(9);

        let first = proxy.transport().transact(Opcode::Create.code(), &data, 0).unwrap();
        let second = proxy.transport().transact(Opcode::Create.code(), &data, 0).unwrap();

        assert_eq!(first.status, StatusCode::PermissionDenied);
        assert_eq!(second.status, first.status);
        assert_eq!(first.parcel.as_bytes(), second.parcel.as_bytes());
        assert_eq!(service.registry().len(), before);
    }

    #[test]
    fn test_ping_and_descriptor() {
        let (_service, proxy) = setup(Capabilities::default());
        proxy.ping().unwrap();
        assert_eq!(proxy.interface_descriptor().unwrap(), INTERFACE_DESCRIPTOR);
    }

    #[test]
    fn test_proxy_shared_across_threads() {
        let (service, proxy) = setup(Capabilities::default());
        std::thread::scope(|scope| {
            for t in 0..4 {
                let proxy = &proxy;
                scope.spawn(move || {
                    for i in 0..25 {
                        let handle = proxy.create(RemoteHandle::new(1), t * 100 + i).unwrap();
                        assert!(!handle.is_null());
                    }
                });
            }
        });
        assert_eq!(service.registry().len(), 100);
    }
}
