#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use parkwatch_kernel_contracts::notice::{
    AccessToken, NoticeId, NoticeRecord, StoredNoticePayload, NOTICE_CONTRACT_VERSION,
};
use parkwatch_kernel_contracts::observation::{
    EvidenceInput, EvidenceItemId, EvidenceItemRecord, ObservationId, ObservationRecord,
    RegistrationPeriod, OBSERVATION_CONTRACT_VERSION,
};
use parkwatch_kernel_contracts::position::{
    GeoPoint, ParkingPositionId, ParkingPositionInput, ParkingPositionRecord,
};
use parkwatch_kernel_contracts::vehicle::{PlateKey, VehicleDescription, VehicleId, VehicleRecord};
use parkwatch_kernel_contracts::violation::{
    OpenViolationKey, ViolationCategory, ViolationEvent, ViolationEventId, ViolationEventInput,
    ViolationEventType, ViolationId, ViolationProjection, ViolationRecord, ViolationStatus,
    VIOLATION_CONTRACT_VERSION,
};
use parkwatch_kernel_contracts::{
    ActorId, ContractViolation, RowTimestamps, SiteId, SoftDelete, Timestamp,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("foreign key violation on {table}: {key}")]
    ForeignKeyViolation { table: &'static str, key: String },
    #[error("duplicate key on {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error("{table} is append-only")]
    AppendOnlyViolation { table: &'static str },
    #[error("{table} row not found: {key}")]
    NotFound { table: &'static str, key: String },
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
    #[error("store lock poisoned")]
    LockPoisoned,
}

pub const OBSERVATIONS_IDEMPOTENCY_KEY: &str = "observations.idempotency_key";
pub const NOTICES_IDEMPOTENCY_KEY: &str = "notices.idempotency_key";
pub const NOTICES_ACCESS_TOKEN: &str = "notices.access_token";
pub const OPEN_VIOLATION_TUPLE: &str =
    "violations(site_id,vehicle_id,position_id,category) where open";

/// Repository-level soft-delete predicate. Every read path goes through this.
fn live<R: SoftDelete>(row: Option<&R>) -> Option<&R> {
    row.filter(|r| r.is_live())
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewObservation {
    pub site_id: SiteId,
    pub vehicle_id: Option<VehicleId>,
    pub parking_position_id: Option<ParkingPositionId>,
    pub location: Option<GeoPoint>,
    pub observed_at: Timestamp,
    pub registration: Option<RegistrationPeriod>,
    pub idempotency_key: String,
    pub submitted_by: ActorId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewViolation {
    pub site_id: SiteId,
    pub vehicle_id: VehicleId,
    pub position_id: Option<ParkingPositionId>,
    pub category: ViolationCategory,
    pub detected_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotice {
    pub violation_id: ViolationId,
    pub idempotency_key: String,
    pub issued_by: ActorId,
    pub access_token: AccessToken,
    pub payload: StoredNoticePayload,
}

/// Next id per table. Restored wholesale on rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdCounters {
    vehicle: u64,
    position: u64,
    observation: u64,
    evidence: u64,
    violation: u64,
    violation_event: u64,
    notice: u64,
}

impl IdCounters {
    fn new() -> Self {
        Self {
            vehicle: 1,
            position: 1,
            observation: 1,
            evidence: 1,
            violation: 1,
            violation_event: 1,
            notice: 1,
        }
    }
}

/// Inverse of one write. Rollback replays these newest first.
#[derive(Debug, Clone)]
enum Undo {
    Vehicle(VehicleId, Option<VehicleRecord>),
    PlateIndex(PlateKey, Option<VehicleId>),
    Position(ParkingPositionId, Option<ParkingPositionRecord>),
    Observation(ObservationId, Option<ObservationRecord>),
    ObservationKey(String, Option<ObservationId>),
    Evidence(EvidenceItemId, Option<EvidenceItemRecord>),
    EvidenceLinked(ObservationId),
    Violation(ViolationId, Option<ViolationRecord>),
    OpenIndex(OpenViolationKey, Option<ViolationId>),
    VehicleViolationLinked(VehicleId),
    EventAppended(ViolationId),
    Notice(NoticeId, Option<NoticeRecord>),
    NoticeKey(String, Option<NoticeId>),
    NoticeToken(AccessToken, Option<NoticeId>),
}

/// In-memory relational store for the enforcement core.
///
/// One map per table plus explicit unique indexes. Violation status columns are
/// a projection over `violation_events` and are only written by event application.
///
/// Every write goes through a journaling setter, so a transaction costs what it
/// writes, not what the store holds.
#[derive(Debug)]
pub struct EnforcementStore {
    vehicles: BTreeMap<VehicleId, VehicleRecord>,
    // unique (plate, state) among live vehicles
    vehicle_plate_index: BTreeMap<PlateKey, VehicleId>,

    positions: BTreeMap<ParkingPositionId, ParkingPositionRecord>,

    observations: BTreeMap<ObservationId, ObservationRecord>,
    // unique observations.idempotency_key (spans tombstoned rows too)
    observation_idempotency_index: BTreeMap<String, ObservationId>,

    evidence_items: BTreeMap<EvidenceItemId, EvidenceItemRecord>,
    evidence_by_observation: BTreeMap<ObservationId, Vec<EvidenceItemId>>,

    violations: BTreeMap<ViolationId, ViolationRecord>,
    // unique (site, vehicle, position, category) among non-terminal violations
    open_violation_index: BTreeMap<OpenViolationKey, ViolationId>,
    violations_by_vehicle: BTreeMap<VehicleId, Vec<ViolationId>>,

    violation_events: Vec<ViolationEvent>,
    violation_event_positions: BTreeMap<ViolationId, Vec<usize>>,

    notices: BTreeMap<NoticeId, NoticeRecord>,
    notice_idempotency_index: BTreeMap<String, NoticeId>,
    notice_token_index: BTreeMap<AccessToken, NoticeId>,

    ids: IdCounters,
    journal: Vec<Undo>,
    txn_depth: usize,
}

impl Default for EnforcementStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl EnforcementStore {
    pub fn new_in_memory() -> Self {
        Self {
            vehicles: BTreeMap::new(),
            vehicle_plate_index: BTreeMap::new(),
            positions: BTreeMap::new(),
            observations: BTreeMap::new(),
            observation_idempotency_index: BTreeMap::new(),
            evidence_items: BTreeMap::new(),
            evidence_by_observation: BTreeMap::new(),
            violations: BTreeMap::new(),
            open_violation_index: BTreeMap::new(),
            violations_by_vehicle: BTreeMap::new(),
            violation_events: Vec::new(),
            violation_event_positions: BTreeMap::new(),
            notices: BTreeMap::new(),
            notice_idempotency_index: BTreeMap::new(),
            notice_token_index: BTreeMap::new(),
            ids: IdCounters::new(),
            journal: Vec::new(),
            txn_depth: 0,
        }
    }

    /// Runs `f` as one all-or-nothing unit: any error undoes every write `f` made.
    ///
    /// Nests; an inner failure only unwinds the inner writes.
    pub fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut EnforcementStore) -> Result<T, E>,
    {
        let mark = self.journal.len();
        let ids = self.ids;
        self.txn_depth += 1;
        let out = f(self);
        self.txn_depth -= 1;
        if out.is_err() {
            self.roll_back_to(mark);
            self.ids = ids;
        } else if self.txn_depth == 0 {
            self.journal.clear();
        }
        out
    }

    fn roll_back_to(&mut self, mark: usize) {
        while self.journal.len() > mark {
            let Some(undo) = self.journal.pop() else {
                break;
            };
            match undo {
                Undo::Vehicle(id, prev) => restore(&mut self.vehicles, id, prev),
                Undo::PlateIndex(key, prev) => restore(&mut self.vehicle_plate_index, key, prev),
                Undo::Position(id, prev) => restore(&mut self.positions, id, prev),
                Undo::Observation(id, prev) => restore(&mut self.observations, id, prev),
                Undo::ObservationKey(key, prev) => {
                    restore(&mut self.observation_idempotency_index, key, prev)
                }
                Undo::Evidence(id, prev) => restore(&mut self.evidence_items, id, prev),
                Undo::EvidenceLinked(o) => pop_link(&mut self.evidence_by_observation, o),
                Undo::Violation(id, prev) => restore(&mut self.violations, id, prev),
                Undo::OpenIndex(key, prev) => restore(&mut self.open_violation_index, key, prev),
                Undo::VehicleViolationLinked(v) => pop_link(&mut self.violations_by_vehicle, v),
                Undo::EventAppended(v) => {
                    self.violation_events.pop();
                    pop_link(&mut self.violation_event_positions, v);
                }
                Undo::Notice(id, prev) => restore(&mut self.notices, id, prev),
                Undo::NoticeKey(key, prev) => {
                    restore(&mut self.notice_idempotency_index, key, prev)
                }
                Undo::NoticeToken(key, prev) => restore(&mut self.notice_token_index, key, prev),
            }
        }
    }

    fn record(&mut self, undo: Undo) {
        if self.txn_depth > 0 {
            self.journal.push(undo);
        }
    }

    // ------------------------
    // Journaled writes. Nothing else mutates a table.
    // ------------------------

    fn put_vehicle(&mut self, rec: VehicleRecord) {
        let id = rec.vehicle_id;
        let prev = self.vehicles.insert(id, rec);
        self.record(Undo::Vehicle(id, prev));
    }

    fn set_plate_index(&mut self, key: PlateKey, id: VehicleId) {
        let prev = self.vehicle_plate_index.insert(key.clone(), id);
        self.record(Undo::PlateIndex(key, prev));
    }

    fn put_position(&mut self, rec: ParkingPositionRecord) {
        let id = rec.position_id;
        let prev = self.positions.insert(id, rec);
        self.record(Undo::Position(id, prev));
    }

    fn put_observation(&mut self, rec: ObservationRecord) {
        let id = rec.observation_id;
        let prev = self.observations.insert(id, rec);
        self.record(Undo::Observation(id, prev));
    }

    fn set_observation_key(&mut self, key: String, id: ObservationId) {
        let prev = self.observation_idempotency_index.insert(key.clone(), id);
        self.record(Undo::ObservationKey(key, prev));
    }

    fn put_evidence(&mut self, rec: EvidenceItemRecord) {
        let id = rec.evidence_id;
        let observation_id = rec.observation_id;
        let prev = self.evidence_items.insert(id, rec);
        self.record(Undo::Evidence(id, prev));
        self.evidence_by_observation
            .entry(observation_id)
            .or_default()
            .push(id);
        self.record(Undo::EvidenceLinked(observation_id));
    }

    fn put_violation(&mut self, rec: ViolationRecord) {
        let id = rec.violation_id;
        let prev = self.violations.insert(id, rec);
        self.record(Undo::Violation(id, prev));
    }

    fn set_open_index(&mut self, key: OpenViolationKey, id: Option<ViolationId>) {
        let prev = match id {
            Some(id) => self.open_violation_index.insert(key.clone(), id),
            None => self.open_violation_index.remove(&key),
        };
        if prev != id {
            self.record(Undo::OpenIndex(key, prev));
        }
    }

    fn link_vehicle_violation(&mut self, vehicle_id: VehicleId, violation_id: ViolationId) {
        self.violations_by_vehicle
            .entry(vehicle_id)
            .or_default()
            .push(violation_id);
        self.record(Undo::VehicleViolationLinked(vehicle_id));
    }

    fn push_event(&mut self, event: ViolationEvent) {
        let violation_id = event.violation_id;
        let pos = self.violation_events.len();
        self.violation_events.push(event);
        self.violation_event_positions
            .entry(violation_id)
            .or_default()
            .push(pos);
        self.record(Undo::EventAppended(violation_id));
    }

    fn put_notice(&mut self, rec: NoticeRecord) {
        let id = rec.notice_id;
        let prev = self.notices.insert(id, rec);
        self.record(Undo::Notice(id, prev));
    }

    fn set_notice_key(&mut self, key: String, id: NoticeId) {
        let prev = self.notice_idempotency_index.insert(key.clone(), id);
        self.record(Undo::NoticeKey(key, prev));
    }

    fn set_notice_token(&mut self, token: AccessToken, id: NoticeId) {
        let prev = self.notice_token_index.insert(token.clone(), id);
        self.record(Undo::NoticeToken(token, prev));
    }

    // ------------------------
    // Vehicles.
    // ------------------------

    /// Looks up a live vehicle by plate key, creating it on first sighting.
    /// Repeat sightings only move `last_observed_at` forward.
    pub fn resolve_vehicle(
        &mut self,
        plate_key: PlateKey,
        description: VehicleDescription,
        observed_at: Timestamp,
        now: Timestamp,
    ) -> Result<VehicleId, StorageError> {
        if let Some(id) = self.live_vehicle_id_for_plate(&plate_key) {
            if let Some(mut v) = self.vehicles.get(&id).cloned() {
                if observed_at > v.last_observed_at {
                    v.last_observed_at = observed_at;
                }
                v.rows.touch(now);
                self.put_vehicle(v);
            }
            return Ok(id);
        }

        let vehicle_id = VehicleId(self.ids.vehicle);
        let rec = VehicleRecord::v1(vehicle_id, plate_key.clone(), description, observed_at, now)?;
        self.ids.vehicle = self.ids.vehicle.saturating_add(1);
        self.set_plate_index(plate_key, vehicle_id);
        self.put_vehicle(rec);
        Ok(vehicle_id)
    }

    fn live_vehicle_id_for_plate(&self, plate_key: &PlateKey) -> Option<VehicleId> {
        let id = self.vehicle_plate_index.get(plate_key)?;
        live(self.vehicles.get(id)).map(|v| v.vehicle_id)
    }

    pub fn vehicle(&self, vehicle_id: VehicleId) -> Option<&VehicleRecord> {
        live(self.vehicles.get(&vehicle_id))
    }

    pub fn vehicle_by_plate(&self, plate_key: &PlateKey) -> Option<&VehicleRecord> {
        let id = self.vehicle_plate_index.get(plate_key)?;
        live(self.vehicles.get(id))
    }

    pub fn soft_delete_vehicle(
        &mut self,
        vehicle_id: VehicleId,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        let mut v = live(self.vehicles.get(&vehicle_id))
            .cloned()
            .ok_or_else(|| not_found("vehicles", vehicle_id.0))?;
        v.rows.tombstone(now);
        self.put_vehicle(v);
        Ok(())
    }

    // ------------------------
    // Parking positions (administrative edits only).
    // ------------------------

    /// Creates a position when `position_id` is `None`, otherwise edits the live row in place.
    pub fn upsert_parking_position(
        &mut self,
        position_id: Option<ParkingPositionId>,
        input: ParkingPositionInput,
        now: Timestamp,
    ) -> Result<ParkingPositionRecord, StorageError> {
        if let Some(assigned) = input.assigned_vehicle_id {
            if self.vehicle(assigned).is_none() {
                return Err(StorageError::ForeignKeyViolation {
                    table: "parking_positions.assigned_vehicle_id",
                    key: assigned.0.to_string(),
                });
            }
        }

        match position_id {
            None => {
                let id = ParkingPositionId(self.ids.position);
                let rec = ParkingPositionRecord::from_input_v1(id, input, now)?;
                self.ids.position = self.ids.position.saturating_add(1);
                self.put_position(rec.clone());
                Ok(rec)
            }
            Some(id) => {
                let existing = live(self.positions.get(&id))
                    .ok_or_else(|| not_found("parking_positions", id.0))?;
                let mut rec = ParkingPositionRecord::from_input_v1(id, input, now)?;
                rec.rows = existing.rows;
                rec.rows.touch(now);
                self.put_position(rec.clone());
                Ok(rec)
            }
        }
    }

    pub fn parking_position(&self, position_id: ParkingPositionId) -> Option<&ParkingPositionRecord> {
        live(self.positions.get(&position_id))
    }

    pub fn parking_positions_for_site(&self, site_id: &SiteId) -> Vec<&ParkingPositionRecord> {
        self.positions
            .values()
            .filter(|p| p.is_live() && &p.site_id == site_id)
            .collect()
    }

    /// Live position on `site_id` whose circle contains `point`; the tightest circle wins.
    pub fn locate_position(
        &self,
        site_id: &SiteId,
        point: &GeoPoint,
    ) -> Option<&ParkingPositionRecord> {
        self.parking_positions_for_site(site_id)
            .into_iter()
            .filter(|p| p.contains(point))
            .min_by(|a, b| {
                a.radius_m
                    .total_cmp(&b.radius_m)
                    .then(a.position_id.cmp(&b.position_id))
            })
    }

    pub fn soft_delete_parking_position(
        &mut self,
        position_id: ParkingPositionId,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        let mut p = live(self.positions.get(&position_id))
            .cloned()
            .ok_or_else(|| not_found("parking_positions", position_id.0))?;
        p.rows.tombstone(now);
        self.put_position(p);
        Ok(())
    }

    // ------------------------
    // Observations + evidence (immutable facts).
    // ------------------------

    /// Identity of the row holding `idempotency_key`, tombstoned or not.
    pub fn observation_for_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Option<(ObservationId, Option<VehicleId>)> {
        let id = self.observation_idempotency_index.get(idempotency_key)?;
        self.observations
            .get(id)
            .map(|o| (o.observation_id, o.vehicle_id))
    }

    /// Inserts the observation and all of its evidence, or nothing.
    pub fn insert_observation(
        &mut self,
        new: NewObservation,
        evidence: Vec<EvidenceInput>,
        now: Timestamp,
    ) -> Result<ObservationId, StorageError> {
        if self
            .observation_idempotency_index
            .contains_key(&new.idempotency_key)
        {
            return Err(StorageError::DuplicateKey {
                table: OBSERVATIONS_IDEMPOTENCY_KEY,
                key: new.idempotency_key,
            });
        }
        if evidence.is_empty() {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "observations.evidence",
                    reason: "at least one evidence item is required",
                },
            ));
        }
        if let Some(v) = new.vehicle_id {
            if self.vehicle(v).is_none() {
                return Err(StorageError::ForeignKeyViolation {
                    table: "observations.vehicle_id",
                    key: v.0.to_string(),
                });
            }
        }
        if let Some(p) = new.parking_position_id {
            if self.parking_position(p).is_none() {
                return Err(StorageError::ForeignKeyViolation {
                    table: "observations.parking_position_id",
                    key: p.0.to_string(),
                });
            }
        }

        let observation_id = ObservationId(self.ids.observation);
        let mut evidence_rows = Vec::with_capacity(evidence.len());
        let mut next_evidence_id = self.ids.evidence;
        for item in evidence {
            let row = EvidenceItemRecord::from_input_v1(
                EvidenceItemId(next_evidence_id),
                observation_id,
                item,
                now,
            )?;
            next_evidence_id = next_evidence_id.saturating_add(1);
            evidence_rows.push(row);
        }

        let rec = ObservationRecord {
            schema_version: OBSERVATION_CONTRACT_VERSION,
            observation_id,
            site_id: new.site_id,
            vehicle_id: new.vehicle_id,
            parking_position_id: new.parking_position_id,
            location: new.location,
            observed_at: new.observed_at,
            registration: new.registration,
            idempotency_key: new.idempotency_key.clone(),
            submitted_by: new.submitted_by,
            rows: RowTimestamps::new(now),
        };

        self.ids.observation = self.ids.observation.saturating_add(1);
        self.ids.evidence = next_evidence_id;
        self.set_observation_key(new.idempotency_key, observation_id);
        self.put_observation(rec);
        for row in evidence_rows {
            self.put_evidence(row);
        }
        Ok(observation_id)
    }

    pub fn observation(&self, observation_id: ObservationId) -> Option<&ObservationRecord> {
        live(self.observations.get(&observation_id))
    }

    /// Evidence for a live observation, in creation order.
    pub fn evidence_for_observation(&self, observation_id: ObservationId) -> Vec<&EvidenceItemRecord> {
        if self.observation(observation_id).is_none() {
            return Vec::new();
        }
        self.evidence_by_observation
            .get(&observation_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| live(self.evidence_items.get(id)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn observation_has_placard_evidence(&self, observation_id: ObservationId) -> bool {
        self.evidence_for_observation(observation_id)
            .iter()
            .any(|e| e.is_accessible_placard())
    }

    pub fn attempt_overwrite_observation(
        &mut self,
        _observation_id: ObservationId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "observations",
        })
    }

    pub fn attempt_overwrite_evidence_item(
        &mut self,
        _evidence_id: EvidenceItemId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "evidence_items",
        })
    }

    /// Administrative correction only. The row content stays untouched.
    pub fn soft_delete_observation(
        &mut self,
        observation_id: ObservationId,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        let mut o = live(self.observations.get(&observation_id))
            .cloned()
            .ok_or_else(|| not_found("observations", observation_id.0))?;
        o.rows.tombstone(now);
        self.put_observation(o);
        Ok(())
    }

    // ------------------------
    // Violations + append-only event ledger.
    // ------------------------

    pub fn open_violation_for_key(&self, key: &OpenViolationKey) -> Option<ViolationId> {
        let id = self.open_violation_index.get(key)?;
        live(self.violations.get(id))
            .filter(|v| v.is_open())
            .map(|v| v.violation_id)
    }

    /// Creates a violation together with its DETECTED event.
    pub fn open_violation(
        &mut self,
        new: NewViolation,
        observation_id: ObservationId,
        notes: Option<String>,
        performed_by: ActorId,
        now: Timestamp,
    ) -> Result<ViolationId, StorageError> {
        let key = OpenViolationKey::new(
            new.site_id.clone(),
            new.vehicle_id,
            new.position_id,
            new.category,
        );
        if self.open_violation_for_key(&key).is_some() {
            return Err(StorageError::DuplicateKey {
                table: OPEN_VIOLATION_TUPLE,
                key: format!(
                    "{}:{}:{}:{}",
                    key.site_id.as_str(),
                    key.vehicle_id.0,
                    key.position_id.map(|p| p.0.to_string()).unwrap_or_default(),
                    key.category.as_str()
                ),
            });
        }
        if self.vehicle(new.vehicle_id).is_none() {
            return Err(StorageError::ForeignKeyViolation {
                table: "violations.vehicle_id",
                key: new.vehicle_id.0.to_string(),
            });
        }
        if let Some(p) = new.position_id {
            if self.parking_position(p).is_none() {
                return Err(StorageError::ForeignKeyViolation {
                    table: "violations.position_id",
                    key: p.0.to_string(),
                });
            }
        }

        // The row and its DETECTED event land together or not at all.
        self.transaction(|s| {
            let violation_id = ViolationId(s.ids.violation);
            s.ids.violation = s.ids.violation.saturating_add(1);
            s.put_violation(ViolationRecord {
                schema_version: VIOLATION_CONTRACT_VERSION,
                violation_id,
                site_id: new.site_id,
                vehicle_id: new.vehicle_id,
                position_id: key.position_id,
                category: new.category,
                detected_at: new.detected_at,
                status: ViolationStatus::Detected,
                resolved_at: None,
                dismissed_at: None,
                dismissal_reason: None,
                rows: RowTimestamps::new(now),
            });
            s.link_vehicle_violation(new.vehicle_id, violation_id);

            s.append_violation_event(ViolationEventInput {
                violation_id,
                event_type: ViolationEventType::Detected,
                observation_id: Some(observation_id),
                notice_id: None,
                notes,
                performed_by,
                created_at: now,
            })?;
            Ok(violation_id)
        })
    }

    /// Appends one immutable event and re-folds the violation's status projection.
    pub fn append_violation_event(
        &mut self,
        input: ViolationEventInput,
    ) -> Result<ViolationEvent, StorageError> {
        let violation_id = input.violation_id;
        let current = live(self.violations.get(&violation_id))
            .ok_or_else(|| not_found("violations", violation_id.0))?;
        let key = current.open_key();

        if let Some(o) = input.observation_id {
            if !self.observations.contains_key(&o) {
                return Err(StorageError::ForeignKeyViolation {
                    table: "violation_events.observation_id",
                    key: o.0.to_string(),
                });
            }
        }
        if let Some(n) = input.notice_id {
            if !self.notices.contains_key(&n) {
                return Err(StorageError::ForeignKeyViolation {
                    table: "violation_events.notice_id",
                    key: n.0.to_string(),
                });
            }
        }

        let event = ViolationEvent::from_input_v1(
            ViolationEventId(self.ids.violation_event),
            input,
        )?;

        let projection = ViolationProjection::fold(
            self.events_for(violation_id)
                .into_iter()
                .chain(std::iter::once(&event)),
        )
        .ok_or(StorageError::ContractViolation(
            ContractViolation::InvalidValue {
                field: "violation_events.event_type",
                reason: "first event of a violation must change its status",
            },
        ))?;

        if !projection.status.is_terminal() {
            if let Some(holder) = self.open_violation_for_key(&key) {
                if holder != violation_id {
                    return Err(StorageError::DuplicateKey {
                        table: OPEN_VIOLATION_TUPLE,
                        key: format!("violation {}", holder.0),
                    });
                }
            }
        }

        self.ids.violation_event = self.ids.violation_event.saturating_add(1);
        self.push_event(event.clone());
        self.apply_projection(violation_id, &projection, event.created_at);
        Ok(event)
    }

    fn events_for(&self, violation_id: ViolationId) -> Vec<&ViolationEvent> {
        self.violation_event_positions
            .get(&violation_id)
            .map(|positions| {
                positions
                    .iter()
                    .filter_map(|&i| self.violation_events.get(i))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn apply_projection(
        &mut self,
        violation_id: ViolationId,
        projection: &ViolationProjection,
        now: Timestamp,
    ) {
        let Some(mut v) = self.violations.get(&violation_id).cloned() else {
            return;
        };
        v.status = projection.status;
        v.resolved_at = projection.resolved_at;
        v.dismissed_at = projection.dismissed_at;
        v.dismissal_reason = projection.dismissal_reason.clone();
        v.rows.touch(now);

        let key = v.open_key();
        self.put_violation(v);
        if projection.status.is_terminal() {
            if self.open_violation_index.get(&key) == Some(&violation_id) {
                self.set_open_index(key, None);
            }
        } else {
            self.set_open_index(key, Some(violation_id));
        }
    }

    pub fn violation(&self, violation_id: ViolationId) -> Option<&ViolationRecord> {
        live(self.violations.get(&violation_id))
    }

    /// Live, non-terminal violations in id order.
    pub fn open_violations(&self) -> Vec<&ViolationRecord> {
        self.violations
            .values()
            .filter(|v| v.is_live() && v.is_open())
            .collect()
    }

    pub fn open_violations_for_vehicle(
        &self,
        vehicle_id: VehicleId,
        category: ViolationCategory,
    ) -> Vec<&ViolationRecord> {
        self.violations_by_vehicle
            .get(&vehicle_id)
            .into_iter()
            .flatten()
            .filter_map(|id| live(self.violations.get(id)))
            .filter(|v| v.is_open() && v.category == category)
            .collect()
    }

    /// The full audit trail of a live violation, in creation order.
    pub fn violation_events(&self, violation_id: ViolationId) -> Vec<&ViolationEvent> {
        if self.violation(violation_id).is_none() {
            return Vec::new();
        }
        self.events_for(violation_id)
    }

    /// Observations linked through DETECTED / OBSERVATION_ADDED events, first link first.
    pub fn linked_observation_ids(&self, violation_id: ViolationId) -> Vec<ObservationId> {
        let mut out: Vec<ObservationId> = Vec::new();
        for ev in self.violation_events(violation_id) {
            if !ev.event_type.links_observation() {
                continue;
            }
            if let Some(o) = ev.observation_id {
                if !out.contains(&o) {
                    out.push(o);
                }
            }
        }
        out
    }

    pub fn violation_event_rows(&self) -> &[ViolationEvent] {
        &self.violation_events
    }

    pub fn attempt_overwrite_violation_event(
        &mut self,
        _event_id: ViolationEventId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "violation_events",
        })
    }

    /// Re-derives every violation's status columns and the open index from the ledger alone.
    pub fn rebuild_violation_projections_from_ledger(&mut self) {
        let stale: Vec<OpenViolationKey> = self.open_violation_index.keys().cloned().collect();
        for key in stale {
            self.set_open_index(key, None);
        }
        let ids: Vec<ViolationId> = self.violations.keys().copied().collect();
        for id in ids {
            let Some(projection) = ViolationProjection::fold(self.events_for(id)) else {
                continue;
            };
            let Some(mut v) = self.violations.get(&id).cloned() else {
                continue;
            };
            v.status = projection.status;
            v.resolved_at = projection.resolved_at;
            v.dismissed_at = projection.dismissed_at;
            v.dismissal_reason = projection.dismissal_reason;
            let open_key = (v.is_live() && v.is_open()).then(|| v.open_key());
            self.put_violation(v);
            if let Some(key) = open_key {
                self.set_open_index(key, Some(id));
            }
        }
    }

    // ------------------------
    // Notices.
    // ------------------------

    /// Row holding `idempotency_key`, tombstoned or not.
    pub fn notice_for_idempotency_key(&self, idempotency_key: &str) -> Option<&NoticeRecord> {
        let id = self.notice_idempotency_index.get(idempotency_key)?;
        self.notices.get(id)
    }

    pub fn access_token_in_use(&self, token: &AccessToken) -> bool {
        self.notice_token_index.contains_key(token)
    }

    pub fn insert_notice(
        &mut self,
        new: NewNotice,
        now: Timestamp,
    ) -> Result<NoticeRecord, StorageError> {
        if self
            .notice_idempotency_index
            .contains_key(&new.idempotency_key)
        {
            return Err(StorageError::DuplicateKey {
                table: NOTICES_IDEMPOTENCY_KEY,
                key: new.idempotency_key,
            });
        }
        if self.access_token_in_use(&new.access_token) {
            return Err(StorageError::DuplicateKey {
                table: NOTICES_ACCESS_TOKEN,
                key: "<redacted>".to_string(),
            });
        }
        if self.violation(new.violation_id).is_none() {
            return Err(StorageError::ForeignKeyViolation {
                table: "notices.violation_id",
                key: new.violation_id.0.to_string(),
            });
        }

        let notice_id = NoticeId(self.ids.notice);
        self.ids.notice = self.ids.notice.saturating_add(1);
        let rec = NoticeRecord {
            schema_version: NOTICE_CONTRACT_VERSION,
            notice_id,
            violation_id: new.violation_id,
            idempotency_key: new.idempotency_key.clone(),
            issued_by: new.issued_by,
            access_token: new.access_token.clone(),
            payload: new.payload,
            printed_at: None,
            rows: RowTimestamps::new(now),
        };
        self.set_notice_key(new.idempotency_key, notice_id);
        self.set_notice_token(new.access_token, notice_id);
        self.put_notice(rec.clone());
        Ok(rec)
    }

    pub fn notice(&self, notice_id: NoticeId) -> Option<&NoticeRecord> {
        live(self.notices.get(&notice_id))
    }

    pub fn notice_by_access_token(&self, token: &AccessToken) -> Option<&NoticeRecord> {
        let id = self.notice_token_index.get(token)?;
        live(self.notices.get(id))
    }

    pub fn notices_for_violation(&self, violation_id: ViolationId) -> Vec<&NoticeRecord> {
        self.notices
            .values()
            .filter(|n| n.is_live() && n.violation_id == violation_id)
            .collect()
    }

    /// Sets `printed_at` once. A second call keeps the original timestamp.
    pub fn mark_notice_printed(
        &mut self,
        notice_id: NoticeId,
        now: Timestamp,
    ) -> Result<NoticeRecord, StorageError> {
        let mut n = live(self.notices.get(&notice_id))
            .cloned()
            .ok_or_else(|| not_found("notices", notice_id.0))?;
        if n.printed_at.is_none() {
            n.printed_at = Some(now);
            n.rows.touch(now);
            self.put_notice(n.clone());
        }
        Ok(n)
    }

    pub fn soft_delete_notice(
        &mut self,
        notice_id: NoticeId,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        let mut n = live(self.notices.get(&notice_id))
            .cloned()
            .ok_or_else(|| not_found("notices", notice_id.0))?;
        n.rows.tombstone(now);
        self.put_notice(n);
        Ok(())
    }
}

fn restore<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, prev: Option<V>) {
    match prev {
        Some(v) => {
            map.insert(key, v);
        }
        None => {
            map.remove(&key);
        }
    }
}

fn pop_link<K: Ord, T>(map: &mut BTreeMap<K, Vec<T>>, key: K) {
    if let Some(list) = map.get_mut(&key) {
        list.pop();
        if list.is_empty() {
            map.remove(&key);
        }
    }
}

fn not_found(table: &'static str, id: u64) -> StorageError {
    StorageError::NotFound {
        table,
        key: id.to_string(),
    }
}

/// Thread-safe handle; the mutex is the transaction boundary for concurrent callers.
#[derive(Debug, Clone, Default)]
pub struct SharedEnforcementStore {
    inner: Arc<Mutex<EnforcementStore>>,
}

impl SharedEnforcementStore {
    pub fn new(store: EnforcementStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut EnforcementStore) -> Result<T, E>,
    {
        let mut guard = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        guard.transaction(f)
    }

    pub fn read<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&EnforcementStore) -> T,
    {
        let guard = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(&guard))
    }
}
