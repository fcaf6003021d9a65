//! Request argument sequences
//!
//! One definition per opcode of which fields follow the interface token.
//! The proxy encodes through [`Request::encode`], the dispatcher decodes
//! through [`Request::read_args`].

use super::handle::RemoteHandle;
use super::opcode::Opcode;
use super::parcel::{Parcel, ParcelResult};

/// Decoded arguments of one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Create {
        client: RemoteHandle,
        session_id: i32,
    },
    CreateMediaRecorder {
        package_name: String,
    },
    CreateMetadataRetriever,
    GetOmx,
    MakeHdcp {
        create_encryption: bool,
    },
    AddBatteryData {
        params: u32,
    },
    PullBatteryData,
    ListenForRemoteDisplay {
        package_name: String,
        client: RemoteHandle,
        /// Not decoded when `client` is null
        interface_name: Option<String>,
    },
    GetCodecList,
    GetAcousticsData {
        capacity: i32,
    },
}

impl Request {
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Create { .. } => Opcode::Create,
            Request::CreateMediaRecorder { .. } => Opcode::CreateMediaRecorder,
            Request::CreateMetadataRetriever => Opcode::CreateMetadataRetriever,
            Request::GetOmx => Opcode::GetOmx,
            Request::MakeHdcp { .. } => Opcode::MakeHdcp,
            Request::AddBatteryData { .. } => Opcode::AddBatteryData,
            Request::PullBatteryData => Opcode::PullBatteryData,
            Request::ListenForRemoteDisplay { .. } => Opcode::ListenForRemoteDisplay,
            Request::GetCodecList => Opcode::GetCodecList,
            Request::GetAcousticsData { .. } => Opcode::GetAcousticsData,
        }
    }

    /// Build a request message: interface token, then the arguments
    pub fn encode(&self, descriptor: &str) -> ParcelResult<Parcel> {
        let mut parcel = Parcel::new();
        parcel.write_interface_token(descriptor)?;
        self.write_args(&mut parcel)?;
        Ok(parcel)
    }

    fn write_args(&self, parcel: &mut Parcel) -> ParcelResult<()> {
        match self {
            Request::Create { client, session_id } => {
                parcel.write_handle(*client);
                parcel.write_i32(*session_id);
            }
            Request::CreateMediaRecorder { package_name } => {
                parcel.write_string16(package_name)?;
            }
            Request::MakeHdcp { create_encryption } => {
                parcel.write_bool(*create_encryption);
            }
            Request::AddBatteryData { params } => {
                parcel.write_u32(*params);
            }
            Request::ListenForRemoteDisplay {
                package_name,
                client,
                interface_name,
            } => {
                parcel.write_string16(package_name)?;
                parcel.write_handle(*client);
                parcel.write_string8(interface_name.as_deref().unwrap_or_default())?;
            }
            Request::GetAcousticsData { capacity } => {
                parcel.write_i32(*capacity);
            }
            Request::CreateMetadataRetriever
            | Request::GetOmx
            | Request::PullBatteryData
            | Request::GetCodecList => {}
        }
        Ok(())
    }

    /// Decode the arguments of `opcode`; the interface token must
    /// already have been consumed
    pub fn read_args(opcode: Opcode, parcel: &mut Parcel) -> ParcelResult<Self> {
        let request = match opcode {
            Opcode::Create => Request::Create {
                client: parcel.read_handle()?,
                session_id: parcel.read_i32()?,
            },
            Opcode::CreateMediaRecorder => Request::CreateMediaRecorder {
                package_name: parcel.read_string16()?,
            },
            Opcode::CreateMetadataRetriever => Request::CreateMetadataRetriever,
            Opcode::GetOmx => Request::GetOmx,
            Opcode::MakeHdcp => Request::MakeHdcp {
                create_encryption: parcel.read_bool()?,
            },
            Opcode::AddBatteryData => Request::AddBatteryData {
                params: parcel.read_u32()?,
            },
            Opcode::PullBatteryData => Request::PullBatteryData,
            Opcode::ListenForRemoteDisplay => {
                let package_name = parcel.read_string16()?;
                let client = parcel.read_handle()?;
                let interface_name = if client.is_null() {
                    None
                } else {
                    Some(parcel.read_string8()?)
                };
                Request::ListenForRemoteDisplay {
                    package_name,
                    client,
                    interface_name,
                }
            }
            Opcode::GetCodecList => Request::GetCodecList,
            Opcode::GetAcousticsData => Request::GetAcousticsData {
                capacity: parcel.read_i32()?,
            },
        };
        Ok(request)
    }
}
