//! MediaBridge - transaction marshalling for a media service boundary
//!
//! Encodes typed calls into parcels, carries them over a transport and
//! dispatches them to a service implementation on the other side.

pub mod config;
pub mod network;
pub mod protocol;
pub mod service;
