//! Service module - both ends of the media service contract
//!
//! Provides:
//! - the implementation trait the callee side fills in
//! - the dispatcher that decodes requests and invokes it
//! - the proxy that turns method calls into transactions
//! - a reference implementation backed by a handle registry

mod dispatcher;
mod local;
mod proxy;
mod registry;

pub use dispatcher::*;
pub use local::*;
pub use proxy::*;
pub use registry::*;

use serde::{Deserialize, Serialize};

use crate::protocol::{Parcel, RemoteHandle, StatusCode};

/// Optional operations a dispatcher instance answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// GET_ACOUSTICS_DATA
    #[serde(default = "default_true")]
    pub acoustics: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { acoustics: true }
    }
}

impl Capabilities {
    /// Only the mandatory operations
    pub fn minimal() -> Self {
        Self { acoustics: false }
    }
}

/// Callee-side implementation of the media service
///
/// Each method backs one opcode. Methods returning a handle may return
/// [`RemoteHandle::NULL`] for "no object".
pub trait MediaPlayerService: Send + Sync {
    fn create(&self, client: RemoteHandle, session_id: i32) -> RemoteHandle;

    fn create_media_recorder(&self, package_name: &str) -> RemoteHandle;

    fn create_metadata_retriever(&self) -> RemoteHandle;

    fn get_omx(&self) -> RemoteHandle;

    fn make_hdcp(&self, create_encryption: bool) -> RemoteHandle;

    fn add_battery_data(&self, params: u32);

    /// Write the service-defined battery payload into `reply`
    fn pull_battery_data(&self, reply: &mut Parcel) -> Result<(), StatusCode>;

    /// Only invoked with a non-null `client`
    fn listen_for_remote_display(
        &self,
        package_name: &str,
        client: RemoteHandle,
        interface_name: &str,
    ) -> RemoteHandle;

    fn get_codec_list(&self) -> RemoteHandle;

    /// Fill the leading entries of the three arrays (all the same length,
    /// the declared capacity) and return how many were filled
    fn get_acoustics_data(
        &self,
        _ids: &mut [i32],
        _sessions: &mut [i32],
        _categories: &mut [i32],
    ) -> Result<usize, StatusCode> {
        Err(StatusCode::InvalidOperation)
    }
}
