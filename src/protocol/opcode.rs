//! Opcode table and per-opcode field schema
//!
//! Both the proxy and the dispatcher check the fields they write against
//! [`schema_for`], so the encode order cannot drift between the two sides
//! without one of them noticing.

use std::fmt;
use thiserror::Error;

use super::parcel::FieldKind;

/// First opcode available to service methods
pub const FIRST_CALL_TRANSACTION: u32 = 1;

/// Generic liveness check answered by every service object
pub const PING_TRANSACTION: u32 = u32::from_be_bytes(*b"_PNG");

/// Generic "which contract do you speak" query
pub const INTERFACE_TRANSACTION: u32 = u32::from_be_bytes(*b"_NTF");

/// Version of the schema table below; bump on any field change
pub const SCHEMA_VERSION: u32 = 1;

/// Service operations, numbered from [`FIRST_CALL_TRANSACTION`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Create = FIRST_CALL_TRANSACTION,
    CreateMediaRecorder,
    CreateMetadataRetriever,
    GetOmx,
    MakeHdcp,
    AddBatteryData,
    PullBatteryData,
    ListenForRemoteDisplay,
    GetCodecList,
    GetAcousticsData,
}

impl Opcode {
    pub const ALL: [Opcode; 10] = [
        Opcode::Create,
        Opcode::CreateMediaRecorder,
        Opcode::CreateMetadataRetriever,
        Opcode::GetOmx,
        Opcode::MakeHdcp,
        Opcode::AddBatteryData,
        Opcode::PullBatteryData,
        Opcode::ListenForRemoteDisplay,
        Opcode::GetCodecList,
        Opcode::GetAcousticsData,
    ];

    /// Look up an opcode by its wire code
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.code() == code)
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Create => "CREATE",
            Opcode::CreateMediaRecorder => "CREATE_MEDIA_RECORDER",
            Opcode::CreateMetadataRetriever => "CREATE_METADATA_RETRIEVER",
            Opcode::GetOmx => "GET_OMX",
            Opcode::MakeHdcp => "MAKE_HDCP",
            Opcode::AddBatteryData => "ADD_BATTERY_DATA",
            Opcode::PullBatteryData => "PULL_BATTERY_DATA",
            Opcode::ListenForRemoteDisplay => "LISTEN_FOR_REMOTE_DISPLAY",
            Opcode::GetCodecList => "GET_CODEC_LIST",
            Opcode::GetAcousticsData => "GET_ACOUSTICS_DATA",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// Expected shape of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// Exactly these fields, always
    Fields(&'static [FieldKind]),
    /// An int32 status, then these fields only when the status is OK
    StatusThen(&'static [FieldKind]),
    /// Service-defined contents, not checked
    Opaque,
}

/// Request and reply layout for one opcode
#[derive(Debug, Clone, Copy)]
pub struct OpcodeSchema {
    pub opcode: Opcode,
    /// Request fields after the interface token
    pub request: &'static [FieldKind],
    pub reply: ReplyShape,
}

use FieldKind::*;

const SCHEMA: [OpcodeSchema; 10] = [
    OpcodeSchema {
        opcode: Opcode::Create,
        request: &[Handle, Int32],
        reply: ReplyShape::Fields(&[Handle]),
    },
    OpcodeSchema {
        opcode: Opcode::CreateMediaRecorder,
        request: &[String16],
        reply: ReplyShape::Fields(&[Handle]),
    },
    OpcodeSchema {
        opcode: Opcode::CreateMetadataRetriever,
        request: &[],
        reply: ReplyShape::Fields(&[Handle]),
    },
    OpcodeSchema {
        opcode: Opcode::GetOmx,
        request: &[],
        reply: ReplyShape::Fields(&[Handle]),
    },
    OpcodeSchema {
        opcode: Opcode::MakeHdcp,
        request: &[Bool],
        reply: ReplyShape::Fields(&[Handle]),
    },
    OpcodeSchema {
        opcode: Opcode::AddBatteryData,
        request: &[Int32],
        reply: ReplyShape::Fields(&[]),
    },
    OpcodeSchema {
        opcode: Opcode::PullBatteryData,
        request: &[],
        reply: ReplyShape::Opaque,
    },
    OpcodeSchema {
        opcode: Opcode::ListenForRemoteDisplay,
        request: &[String16, Handle, String8],
        reply: ReplyShape::Fields(&[Handle]),
    },
    OpcodeSchema {
        opcode: Opcode::GetCodecList,
        request: &[],
        reply: ReplyShape::Fields(&[Handle]),
    },
    OpcodeSchema {
        opcode: Opcode::GetAcousticsData,
        request: &[Int32],
        reply: ReplyShape::StatusThen(&[Int32, RawInt32s, RawInt32s, RawInt32s]),
    },
];

/// Schema entry for `opcode`
pub fn schema_for(opcode: Opcode) -> &'static OpcodeSchema {
    // SCHEMA is ordered by opcode
    &SCHEMA[(opcode.code() - FIRST_CALL_TRANSACTION) as usize]
}

/// A written message did not match the schema table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{opcode} schema v{version} expects {expected:?}, message has {actual:?}", version = SCHEMA_VERSION)]
pub struct SchemaDrift {
    pub opcode: Opcode,
    pub expected: Vec<FieldKind>,
    pub actual: Vec<FieldKind>,
}

impl OpcodeSchema {
    /// Check a request's written fields (interface token first)
    pub fn check_request(&self, written: &[FieldKind]) -> Result<(), SchemaDrift> {
        let matches = written.split_first().is_some_and(|(first, rest)| {
            *first == InterfaceToken && rest == self.request
        });
        if matches {
            Ok(())
        } else {
            let mut expected = vec![InterfaceToken];
            expected.extend_from_slice(self.request);
            Err(self.drift(expected, written))
        }
    }

    /// Check a reply's written fields; `status_ok` is whether a
    /// status-bearing reply reported success
    pub fn check_reply(&self, written: &[FieldKind], status_ok: bool) -> Result<(), SchemaDrift> {
        let expected: Vec<FieldKind> = match self.reply {
            ReplyShape::Opaque => return Ok(()),
            ReplyShape::Fields(fields) => fields.to_vec(),
            ReplyShape::StatusThen(fields) => {
                let mut expected = vec![Int32];
                if status_ok {
                    expected.extend_from_slice(fields);
                }
                expected
            }
        };
        if written == expected.as_slice() {
            Ok(())
        } else {
            Err(self.drift(expected, written))
        }
    }

    fn drift(&self, expected: Vec<FieldKind>, actual: &[FieldKind]) -> SchemaDrift {
        SchemaDrift {
            opcode: self.opcode,
            expected,
            actual: actual.to_vec(),
        }
    }
}
