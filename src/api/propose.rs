use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Administrative operations proposed through the log as `RequestDataType::Custom` requests.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposeOp {
    Backup,
    TransferRemoteSnap,
    ApplyRemoteSnap,
    ApplySkippedRemoteSnap,
    DeleteTable,
}

/// JSON payload of a custom request, e.g. `{"propose_op":"backup"}`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CustomProposeData {
    pub propose_op: ProposeOp,
}

impl CustomProposeData {
    pub fn new(propose_op: ProposeOp) -> Self {
        CustomProposeData { propose_op }
    }

    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
