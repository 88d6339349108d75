use uuid::Uuid;

use crate::error::DispatchError;
use crate::state::AppState;

/// One unit of work for the dispatch engine: an order that is ready for
/// delivery, plus the couriers to skip in this round. The exclusion list
/// is round-local; a courier who bounced an assignment is back in the
/// pool on the next dispatch of the same order.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub order_id: Uuid,
    pub exclude: Vec<Uuid>,
}

impl DispatchRequest {
    pub fn new(order_id: Uuid) -> Self {
        Self {
            order_id,
            exclude: Vec::new(),
        }
    }

    pub fn excluding(order_id: Uuid, courier_id: Uuid) -> Self {
        Self {
            order_id,
            exclude: vec![courier_id],
        }
    }
}

pub async fn enqueue_dispatch(
    state: &AppState,
    request: DispatchRequest,
) -> Result<(), DispatchError> {
    state
        .dispatch_tx
        .send(request)
        .await
        .map_err(|err| DispatchError::Internal(format!("dispatch queue send failed: {err}")))?;

    state.metrics.dispatch_queue_depth.inc();
    Ok(())
}
