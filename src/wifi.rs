// wifi.rs

use std::{fmt, str::FromStr, time::Instant};

use anyhow::{anyhow, bail};
use embedded_svc::wifi::{ClientConfiguration, Configuration};
use esp_idf_svc::{eventloop::EspSystemEventLoop, netif::IpEvent, wifi::{EspWifi, WifiEvent}};
use esp_idf_sys::esp;
use log::*;
use tokio::time::{Duration, sleep};

use crate::*;

pub const MAX_CONNECT_ATTEMPTS: u32 = 5;
pub const CONNECT_TIMEOUT_MS: u64 = 15_000;
pub const RECONNECT_DELAY_MS: u64 = 5_000;
pub const RETRY_COOLDOWN_MS: u64 = 30_000;

const WIFI_TICK_MS: u64 = 250;

/// Hardware address of an access point, printable and parseable in the
/// usual colon-separated hex form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bssid(pub [u8; 6]);

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for Bssid {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| anyhow!("BSSID too short: {s}"))?;
            *slot = u8::from_str_radix(part, 16).map_err(|_| anyhow!("Bad BSSID octet: {part}"))?;
        }
        if parts.next().is_some() {
            bail!("BSSID too long: {s}");
        }
        Ok(Bssid(bytes))
    }
}

/// One access point seen in a scan. Consumed right away to pick the
/// strongest candidate, never stored across cycles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApInfo {
    pub ssid: String,
    pub bssid: Bssid,
    pub channel: u8,
    pub rssi: i8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Connecting,
    Idle,
    #[default]
    Disconnected,
    SsidNotFound,
}

/// The slice of the network stack the connection manager needs.
pub trait Station {
    fn scan(&mut self) -> anyhow::Result<Vec<ApInfo>>;
    fn connect_to(&mut self, bssid: Bssid, channel: u8) -> anyhow::Result<()>;
    fn status(&self) -> LinkStatus;
}

pub trait Clock {
    fn now_ms(&self) -> u64;
}

pub struct MonotonicClock(Instant);

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock(Instant::now())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Default)]
struct ConnState {
    attempts: u32,
    connect_started_ms: Option<u64>,
    reconnect_at_ms: Option<u64>,
    cooldown_until_ms: Option<u64>,
}

pub struct WifiManager<S, C> {
    station: S,
    clock: C,
    ssid: String,
    phase: Phase,
    conn: ConnState,
    current_ap: Option<ApInfo>,
}

impl<S: Station, C: Clock> WifiManager<S, C> {
    pub fn new(station: S, clock: C, ssid: impl Into<String>) -> Self {
        WifiManager {
            station,
            clock,
            ssid: ssid.into(),
            phase: Phase::Disconnected,
            conn: ConnState::default(),
            current_ap: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.conn.attempts
    }

    pub fn station(&self) -> &S {
        &self.station
    }

    /// Scans and picks the strongest AP advertising our network name.
    /// Ties keep the first one seen.
    pub fn select_best_access_point(&mut self) -> anyhow::Result<Option<ApInfo>> {
        info!("Scanning for network {}...", self.ssid);
        let found = self.station.scan()?;

        let mut best: Option<ApInfo> = None;
        for ap in found.into_iter().filter(|ap| ap.ssid == self.ssid) {
            info!(
                "Found {}: {} ({} dBm, channel {})",
                ap.ssid, ap.bssid, ap.rssi, ap.channel
            );
            match &best {
                Some(b) if ap.rssi <= b.rssi => {}
                _ => best = Some(ap),
            }
        }

        if let Some(ap) = &best {
            info!("Selected best AP: {} ({} dBm)", ap.bssid, ap.rssi);
        }
        Ok(best)
    }

    /// Starts one association attempt, pinned to the strongest AP's BSSID
    /// and channel. Counts the attempt even when no candidate was found.
    pub fn connect(&mut self) {
        info!("Connection attempt #{}", self.conn.attempts + 1);

        let candidate = match self.select_best_access_point() {
            Ok(Some(ap)) => ap,
            Ok(None) => {
                error!("Network {} not found", self.ssid);
                self.conn.attempts += 1;
                return;
            }
            Err(e) => {
                error!("Scan failed: {e:?}");
                self.conn.attempts += 1;
                return;
            }
        };

        info!(
            "Connecting to {} via {} (channel {})",
            self.ssid, candidate.bssid, candidate.channel
        );
        if let Err(e) = self.station.connect_to(candidate.bssid, candidate.channel) {
            error!("Connect failed: {e:?}");
        }

        self.phase = Phase::Connecting;
        self.conn.connect_started_ms = Some(self.clock.now_ms());
        self.conn.attempts += 1;
        self.current_ap = Some(candidate);
    }

    /// Called when the station got an IP address.
    pub fn on_connected(&mut self) {
        self.phase = Phase::Connected;
        self.conn = ConnState::default();
        match &self.current_ap {
            Some(ap) => info!(
                "WiFi connected to {} via {} (channel {})",
                self.ssid, ap.bssid, ap.channel
            ),
            None => info!("WiFi connected to {}", self.ssid),
        }
    }

    /// Called on link loss. Arms a delayed reconnect while attempts
    /// remain, otherwise stays down until someone calls connect() again.
    pub fn on_disconnected(&mut self) {
        self.phase = Phase::Disconnected;
        if self.conn.attempts < MAX_CONNECT_ATTEMPTS {
            self.conn.reconnect_at_ms = Some(self.clock.now_ms() + RECONNECT_DELAY_MS);
            info!(
                "WiFi disconnected, reconnecting in {} s",
                RECONNECT_DELAY_MS / 1000
            );
        } else {
            warn!("WiFi disconnected and max connection attempts reached");
        }
    }

    /// Polled from the wifi task. Two independent checks: an in-flight
    /// attempt past its timeout, and a scheduled reconnection coming due.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();

        if let Some(until) = self.conn.cooldown_until_ms {
            if now < until {
                return;
            }
            self.conn.cooldown_until_ms = None;
        }

        if self.phase != Phase::Connected {
            if let Some(started) = self.conn.connect_started_ms {
                if now.saturating_sub(started) > CONNECT_TIMEOUT_MS {
                    self.handle_connect_timeout(now);
                    return;
                }
            }
        }

        if let Some(at) = self.conn.reconnect_at_ms {
            if now >= at {
                self.conn.reconnect_at_ms = None;
                if self.phase != Phase::Connected {
                    info!("Initiating scheduled reconnection...");
                    self.connect();
                }
            }
        }
    }

    fn handle_connect_timeout(&mut self, now: u64) {
        // mid-association states get to finish; re-checked on the next tick
        if !matches!(
            self.station.status(),
            LinkStatus::Disconnected | LinkStatus::Idle | LinkStatus::SsidNotFound
        ) {
            return;
        }

        warn!(
            "WiFi connection timeout after {} s",
            CONNECT_TIMEOUT_MS / 1000
        );
        self.conn.connect_started_ms = None;

        if self.conn.attempts < MAX_CONNECT_ATTEMPTS {
            info!("Retrying connection...");
            self.connect();
        } else {
            warn!(
                "Max connection attempts reached, cooling down for {} s",
                RETRY_COOLDOWN_MS / 1000
            );
            self.conn.attempts = 0;
            self.conn.cooldown_until_ms = Some(now + RETRY_COOLDOWN_MS);
            self.phase = Phase::Disconnected;
        }
    }
}

/// esp-idf station backing the `Station` trait.
pub struct EspStation<'d> {
    wifi: EspWifi<'d>,
    ssid: String,
    password: String,
}

impl<'d> EspStation<'d> {
    pub fn new(wifi: EspWifi<'d>, ssid: &str, password: &str) -> anyhow::Result<Self> {
        let mut station = EspStation {
            wifi,
            ssid: ssid.into(),
            password: password.into(),
        };
        station.apply_client_config(None)?;
        station.wifi.start()?;
        // the radio stays awake for the whole (short) wake window
        esp!(unsafe { esp_idf_sys::esp_wifi_set_ps(esp_idf_sys::wifi_ps_type_t_WIFI_PS_NONE) })?;
        info!("WiFi driver started.");
        Ok(station)
    }

    fn apply_client_config(&mut self, target: Option<(Bssid, u8)>) -> anyhow::Result<()> {
        let mut conf = ClientConfiguration {
            ssid: self
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("SSID too long"))?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("Passphrase too long"))?,
            ..Default::default()
        };
        if let Some((bssid, channel)) = target {
            conf.bssid = Some(bssid.0);
            conf.channel = Some(channel);
        }
        Ok(self.wifi.set_configuration(&Configuration::Client(conf))?)
    }

    pub fn ip_info(&self) -> Option<esp_idf_svc::ipv4::IpInfo> {
        self.wifi.sta_netif().get_ip_info().ok()
    }
}

impl Station for EspStation<'_> {
    fn scan(&mut self) -> anyhow::Result<Vec<ApInfo>> {
        let found = self.wifi.scan()?;
        Ok(found
            .into_iter()
            .map(|ap| ApInfo {
                ssid: ap.ssid.as_str().into(),
                bssid: Bssid(ap.bssid),
                channel: ap.channel,
                rssi: ap.signal_strength,
            })
            .collect())
    }

    fn connect_to(&mut self, bssid: Bssid, channel: u8) -> anyhow::Result<()> {
        self.apply_client_config(Some((bssid, channel)))?;
        Ok(self.wifi.connect()?)
    }

    fn status(&self) -> LinkStatus {
        match self.wifi.is_connected() {
            Ok(true) => LinkStatus::Connected,
            Ok(false) => LinkStatus::Disconnected,
            Err(_) => LinkStatus::Idle,
        }
    }
}

/// Drives the manager: applies link events from the system event loop
/// and polls the timeout checks in between.
pub async fn run_wifi(
    mut manager: WifiManager<EspStation<'static>, MonotonicClock>,
    sysloop: EspSystemEventLoop,
    state: Arc<MyState>,
) -> anyhow::Result<()> {
    let mut wifi_events = sysloop.subscribe_async::<WifiEvent>()?;
    let mut ip_events = sysloop.subscribe_async::<IpEvent>()?;

    info!("Initializing Wi-Fi...");
    manager.connect();

    loop {
        tokio::select! {
            ev = wifi_events.recv() => {
                if let WifiEvent::StaDisconnected(_) = ev? {
                    state.set_link_up(false);
                    manager.on_disconnected();
                }
            }
            ev = ip_events.recv() => {
                if let IpEvent::DhcpIpAssigned(_) = ev? {
                    if let Some(ip_info) = manager.station().ip_info() {
                        info!("IP info: {ip_info:?}");
                    }
                    state.set_link_up(true);
                    manager.on_connected();
                }
            }
            _ = sleep(Duration::from_millis(WIFI_TICK_MS)) => manager.tick(),
        }
    }
}


// EOF
