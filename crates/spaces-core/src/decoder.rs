//! Space lifecycle decoder.
//!
//! Classifies a protocol output into the action recorded in a space's history
//! and the status the space moves to. Everything here is pure: the ingestor
//! loads the space and its history, asks for a [`Decision`], and writes the
//! result.
//!
//! Metadata-style outputs are matched against a fixed precedence list, first
//! match wins:
//!
//! 1. a `bid_value` is present → `rollout`, status `auction`
//! 2. the previous history action is `bid` and the covenant is `transfer` →
//!    `register`, status `registered`
//! 3. the covenant is `bid` → `bid` with the burned total, status unchanged
//! 4. an explicit action label → that label; `revoke` moves to `revoked`
//! 5. anything else → no action, status unchanged

use crate::types::{CovenantKind, MetaOutput, Space, SpaceAction, SpaceHistory, SpaceStatus};

/// The outcome of classifying one protocol output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decision {
    pub action: Option<SpaceAction>,
    pub bid_amount: Option<u64>,
    /// `None` leaves the space's status as it is.
    pub new_status: Option<SpaceStatus>,
}

/// Classify a transfer-style output. The space must already exist.
pub fn classify_transfer(space: &Space) -> Decision {
    let new_status = if space.status == SpaceStatus::Registered {
        None
    } else {
        Some(SpaceStatus::Registered)
    };
    Decision {
        action: Some(SpaceAction::Transfer),
        bid_amount: None,
        new_status,
    }
}

/// Classify a metadata-style output against the space's prior history
/// (oldest first).
pub fn classify_metadata(event: &MetaOutput, history: &[SpaceHistory]) -> Decision {
    if event.bid_value.is_some() {
        return Decision {
            action: Some(SpaceAction::Rollout),
            bid_amount: None,
            new_status: Some(SpaceStatus::Auction),
        };
    }

    let last_action = history.last().and_then(|h| h.action.as_ref());
    if last_action == Some(&SpaceAction::Bid) && event.covenant == Some(CovenantKind::Transfer) {
        return Decision {
            action: Some(SpaceAction::Register),
            bid_amount: None,
            new_status: Some(SpaceStatus::Registered),
        };
    }

    if event.covenant == Some(CovenantKind::Bid) {
        return Decision {
            action: Some(SpaceAction::Bid),
            bid_amount: event.total_burned,
            new_status: None,
        };
    }

    if let Some(label) = event.action.as_deref() {
        let action = SpaceAction::from_label(label);
        let new_status = (action == SpaceAction::Revoke).then_some(SpaceStatus::Revoked);
        return Decision {
            action: Some(action),
            bid_amount: None,
            new_status,
        };
    }

    Decision::default()
}
