use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Term is the raft leadership term a log entry was created in.
#[derive(Copy, Clone, Default, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Term(u64);

impl Term {
    pub fn new(term: u64) -> Self {
        Term(term)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index is the raft log index of an entry. Index 0 never holds an entry, so it doubles as
/// "nothing yet".
#[derive(Copy, Clone, Default, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Index(u64);

impl Index {
    pub fn new(index: u64) -> Self {
        Index(index)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SyncedState is a watermark: the highest `(term, index)` known to be reflected at a destination.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncedState {
    pub term: Term,
    pub index: Index,
}

impl SyncedState {
    pub fn new(term: Term, index: Index) -> Self {
        SyncedState { term, index }
    }

    /// True if the destination has already replayed the entry at `(term, index)`.
    pub fn covers(&self, term: Term, index: Index) -> bool {
        self.term >= term && self.index >= index
    }

    /// True if the destination is past `(term, index)` in both dimensions.
    pub fn is_strictly_newer_than(&self, term: Term, index: Index) -> bool {
        self.term > term && self.index > index
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestDataType {
    KeyValue,
    /// Administrative operation with a JSON `CustomProposeData` payload.
    Custom,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestHeader {
    pub id: u64,
    pub data_type: RequestDataType,
}

/// A single client operation inside a committed batch.
#[derive(Clone, Debug, PartialEq)]
pub struct InternalRequest {
    pub header: RequestHeader,
    pub data: Bytes,
}

impl InternalRequest {
    pub fn key_value(id: u64, data: Bytes) -> Self {
        InternalRequest {
            header: RequestHeader {
                id,
                data_type: RequestDataType::KeyValue,
            },
            data,
        }
    }

    pub fn custom(id: u64, data: Bytes) -> Self {
        InternalRequest {
            header: RequestHeader {
                id,
                data_type: RequestDataType::Custom,
            },
            data,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BatchSource {
    /// Proposed by a client of this cluster.
    Local,
    /// Relayed by a log syncer learner from another cluster.
    FromClusterSyncer,
}

/// CommittedBatch is a batch of client operations plus its provenance. The consensus engine hands
/// it over by value and every stage after that owns it exclusively.
#[derive(Clone, Debug, PartialEq)]
pub struct CommittedBatch {
    pub requests: Vec<InternalRequest>,
    /// 0 means unassigned.
    pub request_id: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub source: BatchSource,
    pub origin_term: Term,
    pub origin_index: Index,
    pub origin_cluster: String,
}

impl CommittedBatch {
    pub fn new(requests: Vec<InternalRequest>, timestamp: Option<DateTime<Utc>>) -> Self {
        CommittedBatch {
            requests,
            request_id: 0,
            timestamp,
            source: BatchSource::Local,
            origin_term: Term::default(),
            origin_index: Index::default(),
            origin_cluster: String::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn origin(&self) -> (Term, Index) {
        (self.origin_term, self.origin_index)
    }

    /// Stamp the position this batch was committed at locally, so the remote cluster can track
    /// what it has replayed.
    pub(crate) fn stamp_for_forwarding(mut self, term: Term, index: Index, origin_cluster: String) -> Self {
        self.origin_term = term;
        self.origin_index = index;
        self.origin_cluster = origin_cluster;
        self.source = BatchSource::FromClusterSyncer;
        if self.request_id == 0 {
            if let Some(first) = self.requests.first() {
                self.request_id = first.header.id;
            }
        }

        self
    }
}
