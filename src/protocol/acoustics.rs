//! Acoustics snapshot transfer
//!
//! The one operation that moves variable-length data: three parallel int32
//! arrays (client id, audio session, stream category) whose length the
//! callee decides at runtime, bounded by a capacity the caller declares.
//!
//! Reply layout:
//! ```text
//! int32 status
//! -- only when status == OK --
//! int32 count
//! count x int32 ids
//! count x int32 sessions
//! count x int32 categories
//! ```
//! The arrays carry no length of their own; the reader takes it from `count`.

use serde::Serialize;

use super::parcel::{Parcel, ParcelError, ParcelResult};
use super::status::StatusCode;

/// Snapshot received by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AcousticsSnapshot {
    pub ids: Vec<i32>,
    pub sessions: Vec<i32>,
    pub categories: Vec<i32>,
}

impl AcousticsSnapshot {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Borrowed view of `count` populated entries per array
#[derive(Debug, Clone, Copy)]
pub struct AcousticsView<'a> {
    pub ids: &'a [i32],
    pub sessions: &'a [i32],
    pub categories: &'a [i32],
}

/// Callee-side working buffers for a single transaction
///
/// Allocated zeroed at the requested capacity and released when dropped,
/// whichever way the transaction exits.
#[derive(Debug)]
pub struct ScratchArrays {
    ids: Vec<i32>,
    sessions: Vec<i32>,
    categories: Vec<i32>,
}

impl ScratchArrays {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: vec![0; capacity],
            sessions: vec![0; capacity],
            categories: vec![0; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.ids.len()
    }

    /// Mutable access to all three arrays at once
    pub fn slices_mut(&mut self) -> (&mut [i32], &mut [i32], &mut [i32]) {
        (
            self.ids.as_mut_slice(),
            self.sessions.as_mut_slice(),
            self.categories.as_mut_slice(),
        )
    }

    /// First `count` entries of each array, if `count` fits
    pub fn view(&self, count: usize) -> Option<AcousticsView<'_>> {
        if count > self.capacity() {
            return None;
        }
        Some(AcousticsView {
            ids: &self.ids[..count],
            sessions: &self.sessions[..count],
            categories: &self.categories[..count],
        })
    }
}

impl Drop for ScratchArrays {
    fn drop(&mut self) {
        tracing::trace!("Releasing acoustics scratch arrays (capacity {})", self.capacity());
    }
}

/// Encode a status-bearing acoustics reply
pub fn write_acoustics_reply(
    reply: &mut Parcel,
    outcome: Result<AcousticsView<'_>, StatusCode>,
) -> ParcelResult<()> {
    match outcome {
        Ok(view) => {
            let count = view.ids.len();
            if view.sessions.len() != count || view.categories.len() != count {
                return Err(ParcelError::OutOfRange(count as i64));
            }
            let count_field =
                i32::try_from(count).map_err(|_| ParcelError::TooLarge(count))?;
            reply.write_i32(StatusCode::OK);
            reply.write_i32(count_field);
            reply.write_raw_i32s(view.ids);
            reply.write_raw_i32s(view.sessions);
            reply.write_raw_i32s(view.categories);
        }
        Err(status) => reply.write_i32(status.to_raw()),
    }
    Ok(())
}

/// Decode an acoustics reply for a request that declared `capacity`
///
/// The outer `Result` is decode corruption; the inner one is the status the
/// callee reported. A count outside `0..=capacity` is corruption.
pub fn read_acoustics_reply(
    reply: &mut Parcel,
    capacity: usize,
) -> ParcelResult<Result<AcousticsSnapshot, StatusCode>> {
    let status = StatusCode::from_raw(reply.read_i32()?);
    if !status.is_ok() {
        return Ok(Err(status));
    }

    let count = reply.read_i32()?;
    let count = usize::try_from(count)
        .ok()
        .filter(|n| *n <= capacity)
        .ok_or(ParcelError::OutOfRange(count as i64))?;

    let ids = reply.read_raw_i32s(count)?;
    let sessions = reply.read_raw_i32s(count)?;
    let categories = reply.read_raw_i32s(count)?;
    Ok(Ok(AcousticsSnapshot {
        ids,
        sessions,
        categories,
    }))
}

/// Caller-side output block
///
/// `capacity` is what the caller declares; [`count`](Self::count) is what
/// the callee produced. The two stay separate fields.
#[derive(Debug)]
pub struct ParallelArrayBlock<'a> {
    pub capacity: i32,
    pub ids: Option<&'a mut [i32]>,
    pub sessions: Option<&'a mut [i32]>,
    pub categories: Option<&'a mut [i32]>,
    count: usize,
}

impl<'a> ParallelArrayBlock<'a> {
    pub fn new(
        capacity: i32,
        ids: Option<&'a mut [i32]>,
        sessions: Option<&'a mut [i32]>,
        categories: Option<&'a mut [i32]>,
    ) -> Self {
        Self {
            capacity,
            ids,
            sessions,
            categories,
            count: 0,
        }
    }

    /// Block whose outputs span the full length of the given slices
    pub fn over(ids: &'a mut [i32], sessions: &'a mut [i32], categories: &'a mut [i32]) -> Self {
        let capacity = ids.len().min(sessions.len()).min(categories.len());
        Self::new(
            i32::try_from(capacity).unwrap_or(i32::MAX),
            Some(ids),
            Some(sessions),
            Some(categories),
        )
    }

    /// Entries written by the last successful transfer
    pub fn count(&self) -> usize {
        self.count
    }

    /// Declared capacity, if the block is usable as-is
    pub fn validate(&self) -> Result<usize, &'static str> {
        let capacity = usize::try_from(self.capacity)
            .ok()
            .filter(|n| *n > 0)
            .ok_or("capacity must be positive")?;

        let outputs = [
            self.ids.as_deref(),
            self.sessions.as_deref(),
            self.categories.as_deref(),
        ];
        for output in outputs {
            match output {
                None => return Err("output location unavailable"),
                Some(slice) if slice.len() < capacity => {
                    return Err("output location smaller than capacity")
                }
                Some(_) => {}
            }
        }
        Ok(capacity)
    }

    /// Copy exactly `snapshot.len()` entries into each output; slots past
    /// that are left as they were
    pub(crate) fn fill(&mut self, snapshot: &AcousticsSnapshot) {
        let count = snapshot.len();
        let pairs = [
            (self.ids.as_deref_mut(), &snapshot.ids),
            (self.sessions.as_deref_mut(), &snapshot.sessions),
            (self.categories.as_deref_mut(), &snapshot.categories),
        ];
        for (output, source) in pairs {
            if let Some(output) = output {
                output[..count].copy_from_slice(&source[..count]);
            }
        }
        self.count = count;
    }
}
