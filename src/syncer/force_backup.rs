use crate::api::{CommittedBatch, CustomProposeData, ProposeOp, RequestDataType};

/// Scan `batch` for an embedded backup request. Undecodable custom payloads are logged and skipped.
pub(super) fn contains_force_backup(logger: &slog::Logger, batch: &CommittedBatch) -> bool {
    let custom_requests = batch
        .requests
        .iter()
        .filter(|request| request.header.data_type == RequestDataType::Custom);

    for request in custom_requests {
        match CustomProposeData::decode(&request.data) {
            Ok(propose) if propose.propose_op == ProposeOp::Backup => {
                slog::info!(logger, "Got force backup request {}", request.header.id);
                return true;
            }
            Ok(_) => {}
            Err(e) => {
                slog::info!(
                    logger,
                    "Failed to decode custom propose {}: {}",
                    request.header.id,
                    e
                );
            }
        }
    }

    false
}
