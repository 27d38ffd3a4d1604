#![forbid(unsafe_code)]

use parkwatch_kernel_contracts::observation::ObservationRecord;
use parkwatch_kernel_contracts::position::{ParkingPositionRecord, ParkingPositionType};
use parkwatch_kernel_contracts::violation::{OpenViolationKey, ViolationCategory};

use crate::registration::is_registration_expired;

/// Violation tuples an observation establishes, in fixed rule order:
/// unauthorized stall, accessible without placard, expired registration.
///
/// Every rule needs a vehicle, so an unidentified vehicle yields nothing.
/// Position rules are skipped when the position belongs to another site.
pub fn applicable_violations(
    observation: &ObservationRecord,
    position: Option<&ParkingPositionRecord>,
) -> Vec<OpenViolationKey> {
    let Some(vehicle_id) = observation.vehicle_id else {
        return Vec::new();
    };
    let mut out = Vec::new();

    if let Some(p) = position.filter(|p| p.site_id == observation.site_id) {
        if p.position_type.is_assigned_stall() && p.assigned_vehicle_id != Some(vehicle_id) {
            out.push(OpenViolationKey::new(
                observation.site_id.clone(),
                vehicle_id,
                Some(p.position_id),
                ViolationCategory::UnauthorizedStall,
            ));
        }
        if p.position_type == ParkingPositionType::Handicapped {
            out.push(OpenViolationKey::new(
                observation.site_id.clone(),
                vehicle_id,
                Some(p.position_id),
                ViolationCategory::AccessibleNoPlacard,
            ));
        }
    }

    if let Some(period) = observation.registration {
        if is_registration_expired(period, observation.observed_at) {
            out.push(OpenViolationKey::new(
                observation.site_id.clone(),
                vehicle_id,
                None,
                ViolationCategory::ExpiredRegistration,
            ));
        }
    }

    out
}
