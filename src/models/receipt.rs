use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::assignment::AssignmentStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReceiptKind {
    PickupProof,
    DeliveryProof,
}

/// Proof-of-pickup/delivery artifact. Metadata only; the file itself is
/// stored by the uploads collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub courier_id: Uuid,
    pub kind: ReceiptKind,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Which proof kinds an assignment in the given status may receive.
/// Nothing before acceptance, pickup proof once accepted, delivery proof
/// once the courier is moving, everything after the attempt settled.
pub fn allowed_kinds(status: AssignmentStatus) -> &'static [ReceiptKind] {
    use AssignmentStatus::*;
    match status {
        Assigned | Rejected | TimedOut => &[],
        Accepted => &[ReceiptKind::PickupProof],
        InTransit | Delivered | Failed => &[ReceiptKind::PickupProof, ReceiptKind::DeliveryProof],
    }
}
