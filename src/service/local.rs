//! Reference in-process service implementation
//!
//! Registers every created object in an [`ObjectRegistry`] and reports live
//! players in the acoustics snapshot. Object behaviour beyond creation is
//! out of scope.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use super::{MediaPlayerService, ObjectRegistry};
use crate::protocol::{Parcel, RemoteHandle, StatusCode};

/// Stream category reported for players by default (music)
pub const STREAM_MUSIC: i32 = 3;

/// Objects the service hands out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaObject {
    Player {
        client: RemoteHandle,
        session_id: i32,
        stream_type: i32,
    },
    Recorder {
        package_name: String,
    },
    MetadataRetriever,
    Omx,
    Hdcp {
        encryption: bool,
    },
    RemoteDisplay {
        package_name: String,
        client: RemoteHandle,
        interface_name: String,
    },
    CodecList,
}

/// Service backed by a local handle registry
#[derive(Debug)]
pub struct LocalMediaService {
    registry: Arc<ObjectRegistry<MediaObject>>,
    omx: OnceLock<RemoteHandle>,
    codec_list: OnceLock<RemoteHandle>,
    battery: Mutex<Vec<u32>>,
    stream_type: i32,
}

impl Default for LocalMediaService {
    fn default() -> Self {
        Self::new(Arc::new(ObjectRegistry::new()))
    }
}

impl LocalMediaService {
    pub fn new(registry: Arc<ObjectRegistry<MediaObject>>) -> Self {
        Self {
            registry,
            omx: OnceLock::new(),
            codec_list: OnceLock::new(),
            battery: Mutex::new(Vec::new()),
            stream_type: STREAM_MUSIC,
        }
    }

    /// Stream category reported for new players
    pub fn with_stream_type(mut self, stream_type: i32) -> Self {
        self.stream_type = stream_type;
        self
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry<MediaObject>> {
        &self.registry
    }

    fn register(&self, object: MediaObject) -> RemoteHandle {
        let handle = self.registry.register(object);
        tracing::debug!("Registered {}", handle);
        handle
    }
}

impl MediaPlayerService for LocalMediaService {
    fn create(&self, client: RemoteHandle, session_id: i32) -> RemoteHandle {
        self.register(MediaObject::Player {
            client,
            session_id,
            stream_type: self.stream_type,
        })
    }

    fn create_media_recorder(&self, package_name: &str) -> RemoteHandle {
        self.register(MediaObject::Recorder {
            package_name: package_name.to_string(),
        })
    }

    fn create_metadata_retriever(&self) -> RemoteHandle {
        self.register(MediaObject::MetadataRetriever)
    }

    fn get_omx(&self) -> RemoteHandle {
        *self.omx.get_or_init(|| self.register(MediaObject::Omx))
    }

    fn make_hdcp(&self, create_encryption: bool) -> RemoteHandle {
        self.register(MediaObject::Hdcp {
            encryption: create_encryption,
        })
    }

    fn add_battery_data(&self, params: u32) {
        self.battery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params);
    }

    fn pull_battery_data(&self, reply: &mut Parcel) -> Result<(), StatusCode> {
        let battery = self.battery.lock().unwrap_or_else(PoisonError::into_inner);
        let count = i32::try_from(battery.len()).map_err(|_| StatusCode::NoMemory)?;
        reply.write_i32(count);
        for params in battery.iter() {
            reply.write_u32(*params);
        }
        Ok(())
    }

    fn listen_for_remote_display(
        &self,
        package_name: &str,
        client: RemoteHandle,
        interface_name: &str,
    ) -> RemoteHandle {
        self.register(MediaObject::RemoteDisplay {
            package_name: package_name.to_string(),
            client,
            interface_name: interface_name.to_string(),
        })
    }

    fn get_codec_list(&self) -> RemoteHandle {
        *self.codec_list.get_or_init(|| self.register(MediaObject::CodecList))
    }

    fn get_acoustics_data(
        &self,
        ids: &mut [i32],
        sessions: &mut [i32],
        categories: &mut [i32],
    ) -> Result<usize, StatusCode> {
        let capacity = ids.len().min(sessions.len()).min(categories.len());
        let players = self
            .registry
            .snapshot()
            .into_iter()
            .filter_map(|(handle, object)| match *object {
                MediaObject::Player {
                    session_id,
                    stream_type,
                    ..
                } => Some((handle, session_id, stream_type)),
                _ => None,
            })
            .take(capacity);

        let mut count = 0;
        for (handle, session_id, stream_type) in players {
            ids[count] = handle.id().unwrap_or_default() as i32;
            sessions[count] = session_id;
            categories[count] = stream_type;
            count += 1;
        }
        Ok(count)
    }
}
