#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use parkwatch_engines::transition::TransitionPolicy;
use parkwatch_kernel_contracts::observation::{
    EvidenceContent, EvidenceInput, EvidenceIntent, ObservationId, ObservationSubmitRequest,
};
use parkwatch_kernel_contracts::position::{
    GeoPoint, ParkingPositionId, ParkingPositionInput, ParkingPositionType,
};
use parkwatch_kernel_contracts::vehicle::{VehicleDescription, VehicleId};
use parkwatch_kernel_contracts::violation::ViolationId;
use parkwatch_kernel_contracts::{ActorId, SiteId, Timestamp};
use parkwatch_storage::repo::ParkingPositionRepo;
use parkwatch_storage::SharedEnforcementStore;

use crate::config::EnforcementConfig;
use crate::derivation::ViolationDerivationRuntime;
use crate::intake::ObservationIntakeRuntime;

pub fn t(hours: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap() + Duration::hours(hours)
}

pub fn config() -> Arc<EnforcementConfig> {
    Arc::new(EnforcementConfig::mvp_v1())
}

pub fn strict_config() -> Arc<EnforcementConfig> {
    let mut c = EnforcementConfig::mvp_v1();
    c.transition_policy = TransitionPolicy::Strict;
    Arc::new(c)
}

pub fn officer() -> ActorId {
    ActorId::new("officer_1").unwrap()
}

pub fn site() -> SiteId {
    SiteId::new("lot_a").unwrap()
}

pub fn photo(key: &str) -> EvidenceInput {
    EvidenceInput {
        content: EvidenceContent::Photo {
            storage_key: key.to_string(),
        },
        intent: None,
    }
}

pub fn note(text: &str) -> EvidenceInput {
    EvidenceInput {
        content: EvidenceContent::Note {
            text: text.to_string(),
        },
        intent: None,
    }
}

pub fn placard_note() -> EvidenceInput {
    EvidenceInput {
        content: EvidenceContent::Photo {
            storage_key: "uploads/placard.jpg".to_string(),
        },
        intent: Some(EvidenceIntent::accessible_placard()),
    }
}

pub fn submit_request(key: &str, plate: &str) -> ObservationSubmitRequest {
    ObservationSubmitRequest {
        site_id: site(),
        license_plate: Some(plate.to_string()),
        issuing_state: Some("CA".to_string()),
        vehicle_description: VehicleDescription::default(),
        parking_position_id: None,
        location: None,
        observed_at: t(0),
        registration_month: None,
        registration_year: None,
        idempotency_key: key.to_string(),
        evidence: vec![photo("uploads/front.jpg")],
    }
}

pub fn add_position(
    store: &SharedEnforcementStore,
    position_type: ParkingPositionType,
    assigned_vehicle_id: Option<VehicleId>,
) -> ParkingPositionId {
    store
        .with_transaction(|s| {
            s.upsert_parking_position_row(
                None,
                ParkingPositionInput {
                    site_id: site(),
                    position_type,
                    center: GeoPoint::new(47.6062, -122.3321).unwrap(),
                    radius_m: 3.0,
                    identifier: Some("A-12".to_string()),
                    assigned_vehicle_id,
                },
                t(-100),
            )
        })
        .unwrap()
        .position_id
}

/// Submits an observation at `at` and returns its id.
pub fn observe(
    store: &SharedEnforcementStore,
    key: &str,
    plate: &str,
    position: Option<ParkingPositionId>,
    evidence: Vec<EvidenceInput>,
    at: Timestamp,
) -> ObservationId {
    let mut req = submit_request(key, plate);
    req.parking_position_id = position;
    req.observed_at = at;
    req.evidence = evidence;
    ObservationIntakeRuntime::new(config())
        .submit(store, &req, &officer(), at)
        .unwrap()
        .observation_id
}

/// Observes and derives in one step.
pub fn observe_and_derive(
    store: &SharedEnforcementStore,
    key: &str,
    plate: &str,
    position: Option<ParkingPositionId>,
    evidence: Vec<EvidenceInput>,
    at: Timestamp,
) -> (ObservationId, Vec<ViolationId>) {
    let observation_id = observe(store, key, plate, position, evidence, at);
    let touched = ViolationDerivationRuntime::new(config())
        .derive_for_observation_id(store, observation_id, &officer(), at)
        .unwrap();
    (observation_id, touched)
}
