// ── Interface classification ──
//
// Splits the wireless adapter population into exactly one removable and one
// onboard radio. Anything else fails closed: guessing here would put the
// access point on the radio the operator meant for the uplink.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::model::{BusOrigin, PhysicalAdapter};

/// The result of a successful classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedAdapters {
    pub removable: PhysicalAdapter,
    pub onboard: PhysicalAdapter,
}

/// Partition `adapters` by bus origin.
///
/// Requires at least two adapters and exactly one of each origin.
pub fn classify(adapters: &[PhysicalAdapter]) -> Result<ClassifiedAdapters, CoreError> {
    if adapters.len() < 2 {
        return Err(CoreError::InsufficientAdapters {
            found: adapters.len(),
        });
    }

    let (removable, onboard): (Vec<&PhysicalAdapter>, Vec<&PhysicalAdapter>) = adapters
        .iter()
        .partition(|adapter| adapter.bus_origin == BusOrigin::Removable);

    match (removable.as_slice(), onboard.as_slice()) {
        ([removable], [onboard]) => {
            debug!(
                removable = %removable.mac_address,
                onboard = %onboard.mac_address,
                "classified wireless adapters"
            );
            Ok(ClassifiedAdapters {
                removable: (*removable).clone(),
                onboard: (*onboard).clone(),
            })
        }
        _ => Err(CoreError::AmbiguousTopology {
            removable: removable.len(),
            onboard: onboard.len(),
        }),
    }
}
