/*!
 * Periodic JSON snapshots of the aircraft table.
 *
 * Three files land in the snapshot directory: `aircraft.json` (current
 * state, rewritten every refresh interval), `history_NN.json` (a
 * 120-slot ring updated every 30 s) and `receiver.json` (written once).
 * Every file is written to a temporary name then renamed, so readers
 * never observe a partial document.
 */
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rx1090::decode::cpr::Position;
use rx1090::decode::time::now_in_s;
use rx1090::track::{Aircraft, Tracker};
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// Slots in the history ring
pub const HISTORY_SLOTS: usize = 120;

/// Seconds between history snapshots
const HISTORY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
pub struct AircraftJson {
    pub hex: String,
    #[serde(rename = "type")]
    pub addr_type: rx1090::decode::AddressType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squawk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_baro: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_geom: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ias: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tas: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baro_rate: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nac_p: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sil: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_km: Option<f64>,
    pub messages: u64,
    /// Seconds since the last message
    pub seen: f64,
}

impl AircraftJson {
    fn from_aircraft(aircraft: &Aircraft, now: f64) -> Self {
        let position = aircraft.live_position(now).map(|p| p.value);
        AircraftJson {
            hex: format!("{}", aircraft.addr),
            addr_type: aircraft.addr_type,
            flight: aircraft
                .callsign
                .as_ref()
                .map(|c| c.value.trim_end().to_string()),
            squawk: aircraft.squawk.as_ref().map(|s| format!("{}", s.value)),
            lat: position.map(|p| p.latitude),
            lon: position.map(|p| p.longitude),
            alt_baro: aircraft.altitude_baro.as_ref().map(|a| a.value),
            alt_geom: aircraft.altitude_geom.as_ref().map(|a| a.value),
            gs: aircraft.groundspeed.as_ref().map(|g| g.value),
            ias: aircraft.ias.as_ref().map(|v| v.value),
            tas: aircraft.tas.as_ref().map(|v| v.value),
            track: aircraft.track_angle.as_ref().map(|t| t.value),
            baro_rate: aircraft.vertical_rate.as_ref().map(|v| v.value),
            nac_p: aircraft.nac_p.as_ref().map(|v| v.value),
            sil: aircraft.sil.as_ref().map(|v| v.value),
            version: aircraft.adsb_version.as_ref().map(|v| v.value),
            rssi: aircraft.rssi(),
            range_km: aircraft.range_km,
            messages: aircraft.messages,
            seen: (now - aircraft.last_seen).max(0.0),
        }
    }
}

#[derive(Debug, Serialize)]
struct AircraftFile {
    now: f64,
    messages: u64,
    aircraft: Vec<AircraftJson>,
}

#[derive(Debug, Serialize)]
struct ReceiverFile {
    version: &'static str,
    refresh: u64,
    history: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lon: Option<f64>,
}

async fn write_atomic(dir: &Path, name: &str, content: &str) {
    let target = dir.join(name);
    let tmp = dir.join(format!("{name}.tmp"));
    let result = async {
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &target).await
    }
    .await;
    if let Err(e) = result {
        warn!("cannot write {}: {e}", target.display());
    }
}

async fn render(tracker: &Mutex<Tracker>) -> String {
    let now = now_in_s();
    let tracker = tracker.lock().await;
    let file = AircraftFile {
        now,
        messages: tracker.stats.messages,
        aircraft: tracker
            .aircraft()
            .map(|a| AircraftJson::from_aircraft(a, now))
            .collect(),
    };
    serde_json::to_string(&file).unwrap_or_else(|_| "{}".to_string())
}

/// Write the snapshot files until the pipeline shuts down.
pub async fn run(
    dir: PathBuf,
    tracker: Arc<Mutex<Tracker>>,
    refresh_ms: u64,
    receiver: Option<Position>,
) {
    if let Err(e) = fs::create_dir_all(&dir).await {
        warn!("cannot create {}: {e}", dir.display());
        return;
    }

    let receiver_file = ReceiverFile {
        version: env!("CARGO_PKG_VERSION"),
        refresh: refresh_ms,
        history: HISTORY_SLOTS,
        lat: receiver.map(|r| r.latitude),
        lon: receiver.map(|r| r.longitude),
    };
    if let Ok(content) = serde_json::to_string(&receiver_file) {
        write_atomic(&dir, "receiver.json", &content).await;
    }
    info!("writing snapshots to {}", dir.display());

    let mut history_slot = 0usize;
    let mut last_history = Duration::ZERO;
    let refresh = Duration::from_millis(refresh_ms.max(100));

    loop {
        sleep(refresh).await;
        let content = render(&tracker).await;
        write_atomic(&dir, "aircraft.json", &content).await;

        last_history += refresh;
        if last_history >= HISTORY_INTERVAL {
            last_history = Duration::ZERO;
            let name = format!("history_{history_slot}.json");
            write_atomic(&dir, &name, &content).await;
            history_slot = (history_slot + 1) % HISTORY_SLOTS;
        }
    }
}
