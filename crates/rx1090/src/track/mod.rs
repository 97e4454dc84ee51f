/*!
 * The aircraft tracker.
 *
 * Every decoded message lands here and is merged into a per-aircraft
 * record keyed by address and addressing scheme. Each field carries the
 * surveillance source that last wrote it and its update time: a field is
 * only overwritten by data of at least the same quality, unless the
 * current value has expired. CPR frames are stashed per encoding type
 * and resolved globally (even/odd pair) or locally (against the last
 * known position) with range and consistency gates.
 */
use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::decode::adsb::{ControlFieldKind, CoarseTisbPosition, ME, MEKind};
use crate::decode::bds::bds05::{AirbornePosition, AltitudeSource};
use crate::decode::bds::bds06::SurfacePosition;
use crate::decode::bds::bds08::WakeVortex;
use crate::decode::bds::bds09::{AirborneVelocitySubType, AirspeedType};
use crate::decode::bds::bds61::EmergencyState;
use crate::decode::bds::bds62::TargetStateAndStatus;
use crate::decode::bds::bds65::OperationStatus;
use crate::decode::cpr::{
    self, CPRFormat, CprFrame, Position,
};
use crate::decode::{
    AddressType, DataSource, IdentityCode, Message, TimedMessage, DF, ICAO,
};

/// Per-field expiry, in seconds.
pub mod ttl {
    pub const POSITION: f64 = 60.0;
    pub const ALTITUDE: f64 = 15.0;
    pub const VELOCITY: f64 = 15.0;
    pub const CALLSIGN: f64 = 300.0;
    pub const SQUAWK: f64 = 60.0;
    pub const CATEGORY: f64 = 600.0;
    pub const AIR_GROUND: f64 = 15.0;
    pub const STATUS: f64 = 60.0;
}

/// Global CPR pairing window, seconds
const CPR_PAIR_WINDOW: f64 = 10.0;

/// Maximum age of a reference position for a local decode, seconds
const CPR_LOCAL_WINDOW: f64 = 180.0;

/// A new fix further than this from the previous one is discarded, km
const CPR_MAX_JUMP_KM: f64 = 50.0;

/// Recent signal levels kept per aircraft
const SIGNAL_HISTORY: usize = 8;

#[derive(Debug, Default, Clone, Serialize)]
pub struct TrackStats {
    pub messages: u64,
    pub created: u64,
    pub expired: u64,
    pub cpr_global_ok: u64,
    pub cpr_local_ok: u64,
    pub cpr_rejected: u64,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Receiver location, reference for surface decoding and ranges
    pub receiver: Option<Position>,
    /// Positions further than this from the receiver are rejected, km
    pub max_range_km: Option<f64>,
    /// An aircraft with no update for this long is removed, seconds
    pub display_ttl: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            receiver: None,
            max_range_km: None,
            display_ttl: 60.0,
        }
    }
}

/// A value with the provenance of its last writer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tracked<T> {
    pub value: T,
    pub source: DataSource,
    pub updated: f64,
}

impl<T> Tracked<T> {
    pub fn expired(&self, now: f64, ttl: f64) -> bool {
        now - self.updated > ttl
    }
}

/// Install `value` iff the slot is empty or expired, or the message
/// outranks (or matches and is no older than) the current writer.
fn upgrade<T>(
    slot: &mut Option<Tracked<T>>,
    value: T,
    source: DataSource,
    now: f64,
    ttl: f64,
) -> bool {
    if let Some(current) = slot {
        if !current.expired(now, ttl)
            && (source < current.source
                || (source == current.source && now < current.updated))
        {
            return false;
        }
    }
    *slot = Some(Tracked {
        value,
        source,
        updated: now,
    });
    true
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AirGround {
    Airborne,
    Ground,
}

/// A resolved position with its decoding pedigree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Resolved against a reference rather than an even/odd pair
    pub relative: bool,
    /// On-ground (surface CPR) position
    pub surface: bool,
}

impl PositionFix {
    fn position(&self) -> Position {
        Position {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// The CPR encoding variants tracked separately per aircraft.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum CprKind {
    Airborne,
    Surface,
    Coarse,
}

#[derive(Debug, Default, Clone)]
struct CprSlots {
    even: Option<(CprFrame, f64)>,
    odd: Option<(CprFrame, f64)>,
}

impl CprSlots {
    fn stash(&mut self, frame: CprFrame, now: f64) {
        match frame.parity {
            CPRFormat::Even => self.even = Some((frame, now)),
            CPRFormat::Odd => self.odd = Some((frame, now)),
        }
    }

    /// The stashed pair, oldest first, when both halves are fresh
    fn pair(&self, now: f64) -> Option<(CprFrame, CprFrame)> {
        let (even, t_even) = self.even?;
        let (odd, t_odd) = self.odd?;
        if (t_even - t_odd).abs() > CPR_PAIR_WINDOW
            || now - t_even.max(t_odd) > CPR_PAIR_WINDOW
        {
            return None;
        }
        if t_even <= t_odd {
            Some((even, odd))
        } else {
            Some((odd, even))
        }
    }

    fn clear(&mut self) {
        self.even = None;
        self.odd = None;
    }
}

#[derive(Debug, Default, Clone)]
struct CprState {
    airborne: CprSlots,
    surface: CprSlots,
    coarse: CprSlots,
}

impl CprState {
    fn slots(&mut self, kind: CprKind) -> &mut CprSlots {
        match kind {
            CprKind::Airborne => &mut self.airborne,
            CprKind::Surface => &mut self.surface,
            CprKind::Coarse => &mut self.coarse,
        }
    }
}

/// Everything known about one airframe.
#[derive(Debug, Clone)]
pub struct Aircraft {
    pub addr: ICAO,
    pub addr_type: AddressType,
    pub first_seen: f64,
    pub last_seen: f64,
    pub messages: u64,

    pub callsign: Option<Tracked<String>>,
    pub squawk: Option<Tracked<IdentityCode>>,
    pub emergency: Option<Tracked<EmergencyState>>,
    pub category: Option<Tracked<WakeVortex>>,

    pub altitude_baro: Option<Tracked<i32>>,
    pub altitude_geom: Option<Tracked<i32>>,
    pub geo_minus_baro: Option<Tracked<i16>>,
    pub vertical_rate: Option<Tracked<i16>>,

    pub groundspeed: Option<Tracked<f64>>,
    pub ias: Option<Tracked<u16>>,
    pub tas: Option<Tracked<u16>>,
    pub track_angle: Option<Tracked<f64>>,
    pub heading: Option<Tracked<f64>>,

    pub position: Option<Tracked<PositionFix>>,
    pub air_ground: Option<Tracked<AirGround>>,
    pub alert: Option<Tracked<bool>>,
    pub spi: Option<Tracked<bool>>,

    pub nac_p: Option<Tracked<u8>>,
    pub sil: Option<Tracked<u8>>,
    pub adsb_version: Option<Tracked<u8>>,
    pub op_status: Option<Tracked<OperationStatus>>,
    pub target_state: Option<Tracked<TargetStateAndStatus>>,

    /// Distance from the receiver at the last fix, km
    pub range_km: Option<f64>,
    /// Bearing from the receiver at the last fix, degrees
    pub bearing_deg: Option<f64>,

    signal: [f64; SIGNAL_HISTORY],
    signal_len: usize,
    signal_next: usize,
    cpr: CprState,
}

impl Aircraft {
    fn new(addr: ICAO, addr_type: AddressType, now: f64) -> Self {
        Aircraft {
            addr,
            addr_type,
            first_seen: now,
            last_seen: now,
            messages: 0,
            callsign: None,
            squawk: None,
            emergency: None,
            category: None,
            altitude_baro: None,
            altitude_geom: None,
            geo_minus_baro: None,
            vertical_rate: None,
            groundspeed: None,
            ias: None,
            tas: None,
            track_angle: None,
            heading: None,
            position: None,
            air_ground: None,
            alert: None,
            spi: None,
            nac_p: None,
            sil: None,
            adsb_version: None,
            op_status: None,
            target_state: None,
            range_km: None,
            bearing_deg: None,
            signal: [0.0; SIGNAL_HISTORY],
            signal_len: 0,
            signal_next: 0,
            cpr: CprState::default(),
        }
    }

    fn push_signal(&mut self, level: f64) {
        self.signal[self.signal_next] = level;
        self.signal_next = (self.signal_next + 1) % SIGNAL_HISTORY;
        self.signal_len = (self.signal_len + 1).min(SIGNAL_HISTORY);
    }

    /// Mean of the recent signal power samples, in dBFS
    pub fn rssi(&self) -> Option<f32> {
        if self.signal_len == 0 {
            return None;
        }
        let mean: f64 = self.signal[..self.signal_len].iter().sum::<f64>()
            / self.signal_len as f64;
        Some((10.0 * mean.max(1e-12).log10()) as f32)
    }

    /// The last fix if it is still current
    pub fn live_position(&self, now: f64) -> Option<&Tracked<PositionFix>> {
        self.position
            .as_ref()
            .filter(|p| !p.expired(now, ttl::POSITION))
    }
}

pub struct Tracker {
    config: TrackerConfig,
    aircraft: HashMap<(u32, AddressType), Aircraft>,
    pub stats: TrackStats,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Tracker {
            config,
            aircraft: HashMap::new(),
            stats: TrackStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    pub fn aircraft(&self) -> impl Iterator<Item = &Aircraft> {
        self.aircraft.values()
    }

    pub fn get(&self, addr: ICAO, addr_type: AddressType) -> Option<&Aircraft> {
        self.aircraft.get(&(addr.0, addr_type))
    }

    /// Merge one message; returns the updated record for publication.
    pub fn apply(&mut self, tm: &TimedMessage) -> Option<&Aircraft> {
        self.stats.messages += 1;
        let now = tm.timestamp;

        if tm.source == DataSource::ModeAc {
            return self.apply_mode_ac(tm, now);
        }

        let message = tm.message.as_ref()?;
        let (addr, addr_type) = message.address()?;
        let key = (addr.0, addr_type);

        if !self.aircraft.contains_key(&key) {
            // Mode A/C and invalid sources never open a track on their own
            if tm.source < DataSource::ModeS {
                return None;
            }
            debug!("new aircraft {addr} ({addr_type:?})");
            self.stats.created += 1;
            self.aircraft
                .insert(key, Aircraft::new(addr, addr_type, now));
        }

        // split borrows: position decoding needs config and stats
        let config = self.config.clone();
        let stats = &mut self.stats;
        let aircraft = self
            .aircraft
            .get_mut(&key)
            .expect("record inserted just above");

        aircraft.last_seen = now;
        aircraft.messages += 1;
        if let Some(rssi) = tm.metadata.rssi {
            aircraft.push_signal(dbfs_to_power(f64::from(rssi)));
        }

        apply_message(aircraft, message, tm.source, now, &config, stats);

        self.aircraft.get(&key)
    }

    fn apply_mode_ac(
        &mut self,
        tm: &TimedMessage,
        now: f64,
    ) -> Option<&Aircraft> {
        if tm.frame.len() < 2 {
            return None;
        }
        let code = u16::from_be_bytes([tm.frame[0], tm.frame[1]]);
        let key = (u32::from(code), AddressType::ModeA);
        let aircraft = self.aircraft.entry(key).or_insert_with(|| {
            Aircraft::new(ICAO(u32::from(code)), AddressType::ModeA, now)
        });
        aircraft.last_seen = now;
        aircraft.messages += 1;
        upgrade(
            &mut aircraft.squawk,
            IdentityCode(code),
            DataSource::ModeAc,
            now,
            ttl::SQUAWK,
        );
        self.aircraft.get(&key)
    }

    /// Drop stale aircraft and clear expired fields on the survivors.
    pub fn expire(&mut self, now: f64) {
        let display_ttl = self.config.display_ttl;
        let before = self.aircraft.len();
        self.aircraft
            .retain(|_, aircraft| now - aircraft.last_seen <= display_ttl);
        let removed = before - self.aircraft.len();
        if removed > 0 {
            info!("expired {removed} aircraft");
            self.stats.expired += removed as u64;
        }

        for aircraft in self.aircraft.values_mut() {
            clear_expired(&mut aircraft.position, now, ttl::POSITION);
            clear_expired(&mut aircraft.altitude_baro, now, ttl::ALTITUDE);
            clear_expired(&mut aircraft.altitude_geom, now, ttl::ALTITUDE);
            clear_expired(&mut aircraft.vertical_rate, now, ttl::VELOCITY);
            clear_expired(&mut aircraft.groundspeed, now, ttl::VELOCITY);
            clear_expired(&mut aircraft.ias, now, ttl::VELOCITY);
            clear_expired(&mut aircraft.tas, now, ttl::VELOCITY);
            clear_expired(&mut aircraft.track_angle, now, ttl::VELOCITY);
            clear_expired(&mut aircraft.heading, now, ttl::VELOCITY);
            clear_expired(&mut aircraft.callsign, now, ttl::CALLSIGN);
            clear_expired(&mut aircraft.squawk, now, ttl::SQUAWK);
            clear_expired(&mut aircraft.category, now, ttl::CATEGORY);
            clear_expired(&mut aircraft.air_ground, now, ttl::AIR_GROUND);
            clear_expired(&mut aircraft.op_status, now, ttl::STATUS);
            clear_expired(&mut aircraft.target_state, now, ttl::STATUS);
            clear_expired(&mut aircraft.emergency, now, ttl::STATUS);
        }
    }
}

fn clear_expired<T>(slot: &mut Option<Tracked<T>>, now: f64, ttl: f64) {
    if slot.as_ref().is_some_and(|t| t.expired(now, ttl)) {
        *slot = None;
    }
}

fn apply_message(
    aircraft: &mut Aircraft,
    message: &Message,
    source: DataSource,
    now: f64,
    config: &TrackerConfig,
    stats: &mut TrackStats,
) {
    match &message.df {
        DF::ShortAirAir { vs, ac, .. } | DF::LongAirAir { vs, ac, .. } => {
            if let Some(alt) = ac.0 {
                upgrade(
                    &mut aircraft.altitude_baro,
                    alt,
                    source,
                    now,
                    ttl::ALTITUDE,
                );
            }
            let state = if *vs == 1 {
                AirGround::Ground
            } else {
                AirGround::Airborne
            };
            upgrade(&mut aircraft.air_ground, state, source, now, ttl::AIR_GROUND);
        }
        DF::SurveillanceAltitude { fs, ac, .. } => {
            if let Some(alt) = ac.0 {
                upgrade(
                    &mut aircraft.altitude_baro,
                    alt,
                    source,
                    now,
                    ttl::ALTITUDE,
                );
            }
            apply_flight_status(aircraft, *fs, source, now);
        }
        DF::SurveillanceIdentity { fs, id, .. } => {
            upgrade(&mut aircraft.squawk, *id, source, now, ttl::SQUAWK);
            apply_flight_status(aircraft, *fs, source, now);
        }
        DF::AllCall { capability, .. } => {
            if let Some(on_ground) = capability.on_ground() {
                let state = if on_ground {
                    AirGround::Ground
                } else {
                    AirGround::Airborne
                };
                upgrade(
                    &mut aircraft.air_ground,
                    state,
                    source,
                    now,
                    ttl::AIR_GROUND,
                );
            }
        }
        DF::ExtendedSquitter(adsb) => {
            apply_me(aircraft, &adsb.message, source, now, config, stats);
            if let Some(on_ground) = adsb.capability.on_ground() {
                let state = if on_ground {
                    AirGround::Ground
                } else {
                    AirGround::Airborne
                };
                upgrade(
                    &mut aircraft.air_ground,
                    state,
                    source,
                    now,
                    ttl::AIR_GROUND,
                );
            }
        }
        DF::NonTransponder { cf, .. } => match &cf.kind {
            ControlFieldKind::AdsbNonTransponder { me, .. }
            | ControlFieldKind::AdsbAnonymous { me, .. }
            | ControlFieldKind::TisbFine { me, .. }
            | ControlFieldKind::TisbRelay { me, .. }
            | ControlFieldKind::AdsbRebroadcast { me, .. } => {
                apply_me(aircraft, me, source, now, config, stats);
            }
            ControlFieldKind::TisbCoarse { position, .. } => {
                apply_coarse(aircraft, position, source, now, config, stats);
            }
            ControlFieldKind::TisbManage { .. }
            | ControlFieldKind::Reserved { .. } => {}
        },
        DF::CommBAltitude { fs, ac, bds, .. } => {
            if let Some(alt) = ac.0 {
                upgrade(
                    &mut aircraft.altitude_baro,
                    alt,
                    source,
                    now,
                    ttl::ALTITUDE,
                );
            }
            apply_flight_status(aircraft, *fs, source, now);
            if let Some(callsign) = &bds.bds20 {
                upgrade(
                    &mut aircraft.callsign,
                    callsign.clone(),
                    source,
                    now,
                    ttl::CALLSIGN,
                );
            }
        }
        DF::CommBIdentity { fs, id, bds, .. } => {
            upgrade(&mut aircraft.squawk, *id, source, now, ttl::SQUAWK);
            apply_flight_status(aircraft, *fs, source, now);
            if let Some(callsign) = &bds.bds20 {
                upgrade(
                    &mut aircraft.callsign,
                    callsign.clone(),
                    source,
                    now,
                    ttl::CALLSIGN,
                );
            }
        }
        DF::Military { .. } | DF::CommD { .. } => {}
    }
}

fn apply_flight_status(
    aircraft: &mut Aircraft,
    fs: crate::decode::FlightStatus,
    source: DataSource,
    now: f64,
) {
    if let Some(alert) = fs.alert() {
        upgrade(&mut aircraft.alert, alert, source, now, ttl::STATUS);
    }
    if let Some(spi) = fs.spi() {
        upgrade(&mut aircraft.spi, spi, source, now, ttl::STATUS);
    }
    if let Some(on_ground) = fs.on_ground() {
        let state = if on_ground {
            AirGround::Ground
        } else {
            AirGround::Airborne
        };
        upgrade(&mut aircraft.air_ground, state, source, now, ttl::AIR_GROUND);
    }
}

fn apply_me(
    aircraft: &mut Aircraft,
    me: &ME,
    source: DataSource,
    now: f64,
    config: &TrackerConfig,
    stats: &mut TrackStats,
) {
    match &me.kind {
        MEKind::AircraftIdentification(id) => {
            upgrade(
                &mut aircraft.callsign,
                id.callsign.clone(),
                source,
                now,
                ttl::CALLSIGN,
            );
            upgrade(
                &mut aircraft.category,
                id.wake_vortex,
                source,
                now,
                ttl::CATEGORY,
            );
        }
        MEKind::AirbornePosition(pos) => {
            apply_airborne_position(aircraft, pos, source, now, config, stats);
        }
        MEKind::SurfacePosition(pos) => {
            apply_surface_position(aircraft, pos, source, now, config, stats);
        }
        MEKind::AirborneVelocity(velocity) => {
            if let Some(vr) = velocity.vertical_rate {
                upgrade(
                    &mut aircraft.vertical_rate,
                    vr,
                    source,
                    now,
                    ttl::VELOCITY,
                );
            }
            if let Some(delta) = velocity.geo_minus_baro {
                upgrade(
                    &mut aircraft.geo_minus_baro,
                    delta,
                    source,
                    now,
                    ttl::VELOCITY,
                );
            }
            match &velocity.velocity {
                AirborneVelocitySubType::GroundSpeed(speed) => {
                    upgrade(
                        &mut aircraft.groundspeed,
                        speed.groundspeed,
                        source,
                        now,
                        ttl::VELOCITY,
                    );
                    upgrade(
                        &mut aircraft.track_angle,
                        speed.track,
                        source,
                        now,
                        ttl::VELOCITY,
                    );
                }
                AirborneVelocitySubType::Airspeed(speed) => {
                    if let Some(airspeed) = speed.airspeed {
                        match speed.airspeed_type {
                            AirspeedType::IAS => {
                                upgrade(
                                    &mut aircraft.ias,
                                    airspeed,
                                    source,
                                    now,
                                    ttl::VELOCITY,
                                );
                            }
                            AirspeedType::TAS => {
                                upgrade(
                                    &mut aircraft.tas,
                                    airspeed,
                                    source,
                                    now,
                                    ttl::VELOCITY,
                                );
                            }
                        }
                    }
                    if let Some(heading) = speed.heading {
                        upgrade(
                            &mut aircraft.heading,
                            heading,
                            source,
                            now,
                            ttl::VELOCITY,
                        );
                    }
                }
                _ => {}
            }
        }
        MEKind::AircraftStatus(status) => {
            upgrade(
                &mut aircraft.squawk,
                status.squawk,
                source,
                now,
                ttl::SQUAWK,
            );
            upgrade(
                &mut aircraft.emergency,
                status.emergency_state,
                source,
                now,
                ttl::STATUS,
            );
        }
        MEKind::TargetStateAndStatus(target) => {
            upgrade(
                &mut aircraft.target_state,
                *target,
                source,
                now,
                ttl::STATUS,
            );
            upgrade(&mut aircraft.nac_p, target.nac_p, source, now, ttl::STATUS);
            upgrade(&mut aircraft.sil, target.sil, source, now, ttl::STATUS);
        }
        MEKind::OperationStatus(status) => {
            upgrade(
                &mut aircraft.op_status,
                *status,
                source,
                now,
                ttl::STATUS,
            );
            if let Some(nac_p) = status.nac_p() {
                upgrade(&mut aircraft.nac_p, nac_p, source, now, ttl::STATUS);
            }
            if let Some(version) = status.version() {
                upgrade(
                    &mut aircraft.adsb_version,
                    version,
                    source,
                    now,
                    ttl::STATUS,
                );
            }
        }
        _ => {}
    }
}

fn apply_airborne_position(
    aircraft: &mut Aircraft,
    pos: &AirbornePosition,
    source: DataSource,
    now: f64,
    config: &TrackerConfig,
    stats: &mut TrackStats,
) {
    if let Some(alt) = pos.alt {
        match pos.source {
            AltitudeSource::Barometric => {
                upgrade(
                    &mut aircraft.altitude_baro,
                    alt,
                    source,
                    now,
                    ttl::ALTITUDE,
                );
            }
            AltitudeSource::Gnss => {
                upgrade(
                    &mut aircraft.altitude_geom,
                    alt,
                    source,
                    now,
                    ttl::ALTITUDE,
                );
            }
        }
    }
    let frame = CprFrame {
        lat_cpr: pos.lat_cpr,
        lon_cpr: pos.lon_cpr,
        parity: pos.parity,
    };
    resolve_position(
        aircraft,
        CprKind::Airborne,
        frame,
        source,
        now,
        config,
        stats,
    );
}

fn apply_surface_position(
    aircraft: &mut Aircraft,
    pos: &SurfacePosition,
    source: DataSource,
    now: f64,
    config: &TrackerConfig,
    stats: &mut TrackStats,
) {
    if let Some(speed) = pos.groundspeed {
        upgrade(
            &mut aircraft.groundspeed,
            speed,
            source,
            now,
            ttl::VELOCITY,
        );
    }
    if let Some(track) = pos.track {
        upgrade(
            &mut aircraft.track_angle,
            track,
            source,
            now,
            ttl::VELOCITY,
        );
    }
    upgrade(
        &mut aircraft.air_ground,
        AirGround::Ground,
        source,
        now,
        ttl::AIR_GROUND,
    );
    let frame = CprFrame {
        lat_cpr: pos.lat_cpr,
        lon_cpr: pos.lon_cpr,
        parity: pos.parity,
    };
    resolve_position(
        aircraft,
        CprKind::Surface,
        frame,
        source,
        now,
        config,
        stats,
    );
}

fn apply_coarse(
    aircraft: &mut Aircraft,
    pos: &CoarseTisbPosition,
    source: DataSource,
    now: f64,
    config: &TrackerConfig,
    stats: &mut TrackStats,
) {
    if let Some(alt) = pos.alt {
        upgrade(
            &mut aircraft.altitude_baro,
            alt,
            source,
            now,
            ttl::ALTITUDE,
        );
    }
    if let Some(track) = pos.track {
        upgrade(
            &mut aircraft.track_angle,
            track,
            source,
            now,
            ttl::VELOCITY,
        );
    }
    let frame = CprFrame {
        lat_cpr: pos.lat_cpr,
        lon_cpr: pos.lon_cpr,
        parity: pos.parity,
    };
    resolve_position(
        aircraft,
        CprKind::Coarse,
        frame,
        source,
        now,
        config,
        stats,
    );
}

fn resolve_position(
    aircraft: &mut Aircraft,
    kind: CprKind,
    frame: CprFrame,
    source: DataSource,
    now: f64,
    config: &TrackerConfig,
    stats: &mut TrackStats,
) {
    let reference = aircraft
        .position
        .as_ref()
        .filter(|p| now - p.updated < CPR_LOCAL_WINDOW)
        .map(|p| p.value.position())
        .or(config.receiver);

    aircraft.cpr.slots(kind).stash(frame, now);

    let mut relative = false;
    let decoded = match aircraft.cpr.slots(kind).pair(now) {
        Some((oldest, latest)) => {
            if kind == CprKind::Surface && reference.is_none() {
                // nothing to break the quarter-globe ambiguity with yet
                return;
            }
            let global = match kind {
                CprKind::Airborne => cpr::airborne_global(&oldest, &latest, 17),
                CprKind::Coarse => cpr::airborne_global(&oldest, &latest, 12),
                CprKind::Surface => reference
                    .as_ref()
                    .and_then(|r| cpr::surface_global(&oldest, &latest, r)),
            };
            if global.is_none() {
                // inconsistent pair: start over
                debug!("CPR pair rejected for {}", aircraft.addr);
                aircraft.cpr.slots(kind).clear();
                stats.cpr_rejected += 1;
                return;
            }
            global
        }
        None => {
            relative = true;
            reference.as_ref().and_then(|r| match kind {
                CprKind::Airborne => cpr::airborne_local(&frame, r, 17),
                CprKind::Coarse => cpr::airborne_local(&frame, r, 12),
                CprKind::Surface => cpr::surface_local(&frame, r),
            })
        }
    };

    let Some(position) = decoded else {
        return;
    };

    // range gate against the receiver
    if let (Some(receiver), Some(max_range)) =
        (&config.receiver, config.max_range_km)
    {
        if cpr::haversine(receiver, &position) > max_range {
            debug!("position beyond max range for {}", aircraft.addr);
            aircraft.cpr.slots(kind).clear();
            stats.cpr_rejected += 1;
            return;
        }
    }

    // consistency gate against the previous fix
    if let Some(previous) = aircraft
        .position
        .as_ref()
        .filter(|p| now - p.updated < CPR_LOCAL_WINDOW)
    {
        if cpr::haversine(&previous.value.position(), &position)
            > CPR_MAX_JUMP_KM
        {
            aircraft.cpr.slots(kind).clear();
            stats.cpr_rejected += 1;
            return;
        }
    }

    if relative {
        stats.cpr_local_ok += 1;
    } else {
        stats.cpr_global_ok += 1;
    }

    let fix = PositionFix {
        latitude: position.latitude,
        longitude: position.longitude,
        relative,
        surface: kind == CprKind::Surface,
    };
    if upgrade(&mut aircraft.position, fix, source, now, ttl::POSITION) {
        if let Some(receiver) = &config.receiver {
            aircraft.range_km = Some(cpr::haversine(receiver, &position));
            aircraft.bearing_deg = Some(cpr::bearing(receiver, &position));
        }
    }
}

/// dBFS back to linear power for the signal history
fn dbfs_to_power(db: f64) -> f64 {
    libm::pow(10.0, (db / 10.0).clamp(-120.0, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::SensorMetadata;
    use approx::assert_relative_eq;
    use deku::DekuContainerRead;
    use hexlit::hex;

    fn timed(bytes: &[u8], t: f64) -> TimedMessage {
        let message = Message::from_bytes((bytes, 0)).unwrap().1;
        let source = message.base_source();
        TimedMessage {
            timestamp: t,
            frame: bytes.to_vec(),
            message: Some(message),
            source,
            metadata: SensorMetadata {
                system_timestamp: t,
                ..SensorMetadata::default()
            },
        }
    }

    const IDENT: [u8; 14] = hex!("8D4840D6202CC371C32CE0576098");
    const POS_EVEN: [u8; 14] = hex!("8D40621D58C382D690C8AC2863A7");
    const POS_ODD: [u8; 14] = hex!("8D40621D58C386435CC412692AD6");

    #[test]
    fn identification_fills_callsign_and_category() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let aircraft = tracker.apply(&timed(&IDENT, 1000.0)).unwrap();

        assert_eq!(aircraft.addr, ICAO(0x4840D6));
        assert_eq!(aircraft.addr_type, AddressType::AdsbIcao);
        let callsign = aircraft.callsign.as_ref().unwrap();
        assert_eq!(callsign.value, "KLM1023 ");
        assert_eq!(callsign.source, DataSource::Adsb);
    }

    #[test]
    fn even_odd_pair_resolves_globally() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.apply(&timed(&POS_ODD, 1000.0));
        let aircraft = tracker.apply(&timed(&POS_EVEN, 1005.0)).unwrap();

        let fix = &aircraft.position.as_ref().unwrap().value;
        assert!(!fix.relative);
        assert_relative_eq!(fix.latitude, 52.2572, max_relative = 1e-5);
        assert_relative_eq!(fix.longitude, 3.91937, max_relative = 1e-4);
        assert_eq!(aircraft.altitude_baro.as_ref().unwrap().value, 38000);
        assert_eq!(tracker.stats.cpr_global_ok, 1);
    }

    #[test]
    fn stale_pair_is_not_resolved_globally() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.apply(&timed(&POS_ODD, 1000.0));
        let aircraft = tracker.apply(&timed(&POS_EVEN, 1020.0)).unwrap();

        // no reference either: twenty seconds apart decodes nothing
        assert!(aircraft.position.is_none());
        assert_eq!(tracker.stats.cpr_global_ok, 0);
    }

    #[test]
    fn single_frame_resolves_against_a_reference() {
        let mut tracker = Tracker::new(TrackerConfig {
            receiver: Some(Position {
                latitude: 52.0,
                longitude: 4.0,
            }),
            ..TrackerConfig::default()
        });
        let aircraft = tracker.apply(&timed(&POS_ODD, 1000.0)).unwrap();

        let fix = &aircraft.position.as_ref().unwrap().value;
        assert!(fix.relative);
        assert_relative_eq!(fix.latitude, 52.26578, max_relative = 1e-4);
        assert!(aircraft.range_km.is_some());
        assert!(aircraft.bearing_deg.is_some());
        assert_eq!(tracker.stats.cpr_local_ok, 1);
    }

    #[test]
    fn out_of_range_positions_reset_the_cpr_state() {
        let mut tracker = Tracker::new(TrackerConfig {
            receiver: Some(Position {
                latitude: 52.0,
                longitude: 4.0,
            }),
            max_range_km: Some(10.0),
            ..TrackerConfig::default()
        });
        tracker.apply(&timed(&POS_ODD, 1000.0));
        let aircraft = tracker.apply(&timed(&POS_EVEN, 1005.0)).unwrap();

        assert!(aircraft.position.is_none());
        assert!(tracker.stats.cpr_rejected > 0);
    }

    #[test]
    fn higher_sources_shield_fields_from_lower_ones() {
        let mut tracker = Tracker::new(TrackerConfig::default());

        let mut low = timed(&IDENT, 1000.0);
        low.source = DataSource::TisB;
        tracker.apply(&low);
        let a = tracker.get(ICAO(0x4840D6), AddressType::AdsbIcao).unwrap();
        assert_eq!(a.callsign.as_ref().unwrap().source, DataSource::TisB);

        tracker.apply(&timed(&IDENT, 1001.0));
        let a = tracker.get(ICAO(0x4840D6), AddressType::AdsbIcao).unwrap();
        assert_eq!(a.callsign.as_ref().unwrap().source, DataSource::Adsb);
        assert_eq!(a.callsign.as_ref().unwrap().updated, 1001.0);

        let mut late_low = timed(&IDENT, 1002.0);
        late_low.source = DataSource::TisB;
        tracker.apply(&late_low);
        let a = tracker.get(ICAO(0x4840D6), AddressType::AdsbIcao).unwrap();
        // the lower source did not overwrite the fresher value
        assert_eq!(a.callsign.as_ref().unwrap().source, DataSource::Adsb);
        assert_eq!(a.callsign.as_ref().unwrap().updated, 1001.0);
    }

    #[test]
    fn expired_fields_accept_lower_sources_again() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.apply(&timed(&IDENT, 1000.0));

        let mut low = timed(&IDENT, 1000.0 + ttl::CALLSIGN + 1.0);
        low.source = DataSource::TisB;
        tracker.apply(&low);
        let a = tracker.get(ICAO(0x4840D6), AddressType::AdsbIcao).unwrap();
        assert_eq!(a.callsign.as_ref().unwrap().source, DataSource::TisB);
    }

    #[test]
    fn comm_b_altitude_does_not_touch_the_squawk() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let bytes = hex!("a0001910cc300030aa0000eae004");
        let aircraft = tracker.apply(&timed(&bytes, 1000.0)).unwrap();

        assert_eq!(aircraft.addr_type, AddressType::Unknown);
        assert_eq!(aircraft.altitude_baro.as_ref().unwrap().value, 39000);
        assert!(aircraft.squawk.is_none());
    }

    #[test]
    fn aircraft_expire_after_the_display_ttl() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.apply(&timed(&IDENT, 1000.0));
        assert_eq!(tracker.len(), 1);

        tracker.expire(1050.0);
        assert_eq!(tracker.len(), 1);
        tracker.expire(1070.0);
        assert_eq!(tracker.len(), 0);
        assert_eq!(tracker.stats.expired, 1);
    }

    #[test]
    fn fields_expire_independently() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let bytes = hex!("a0001910cc300030aa0000eae004");
        tracker.apply(&timed(&bytes, 1000.0));
        tracker.apply(&timed(&bytes, 1010.0));

        tracker.expire(1030.0);
        assert_eq!(tracker.len(), 1);
        let a = tracker.aircraft().next().unwrap();
        // altitude (15 s TTL) is gone, the aircraft itself remains
        assert_eq!(a.addr_type, AddressType::Unknown);
        assert!(a.altitude_baro.is_none());
    }

    #[test]
    fn mode_ac_replies_update_mode_a_tracks() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let tm = TimedMessage {
            timestamp: 1000.0,
            frame: vec![0x70, 0x00],
            message: None,
            source: DataSource::ModeAc,
            metadata: SensorMetadata::default(),
        };
        let aircraft = tracker.apply(&tm).unwrap();
        assert_eq!(aircraft.addr_type, AddressType::ModeA);
        assert_eq!(aircraft.squawk.as_ref().unwrap().value.0, 0x7000);
        assert_eq!(
            aircraft.squawk.as_ref().unwrap().source,
            DataSource::ModeAc
        );
    }

    #[test]
    fn replays_are_batching_independent() {
        let sequence: Vec<TimedMessage> = vec![
            timed(&IDENT, 1000.0),
            timed(&POS_ODD, 1001.0),
            timed(&POS_EVEN, 1003.0),
            timed(&IDENT, 1004.0),
        ];

        let mut one = Tracker::new(TrackerConfig::default());
        for tm in &sequence {
            one.apply(tm);
        }
        let mut two = Tracker::new(TrackerConfig::default());
        for tm in &sequence {
            two.apply(tm);
        }

        for a in one.aircraft() {
            let b = two.get(a.addr, a.addr_type).unwrap();
            assert_eq!(a.callsign, b.callsign);
            assert_eq!(a.position, b.position);
            assert_eq!(a.altitude_baro, b.altitude_baro);
            assert_eq!(a.messages, b.messages);
        }
    }
}
