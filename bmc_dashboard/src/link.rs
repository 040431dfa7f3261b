use crate::schedule::{RefreshSchedule, RefreshTiming};
use bmc_protocol::ClientCommand;
use serde::Serialize;
use tokio::time::Instant;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Banner {
    ConnectionLost,
    ConnectionError,
}

impl Banner {
    pub fn message(self) -> &'static str {
        match self {
            Banner::ConnectionLost => "Lost connection to the server. Re-connecting...",
            Banner::ConnectionError => "Server connection error",
        }
    }
}

/// Connection bookkeeping of the sync client, free of any I/O.
///
/// The actor feeds transport events in and sends whatever [`Link::poll`] hands
/// back. Refresh only ever runs while `Connected` with the switch on.
#[derive(Debug, Clone)]
pub struct Link {
    state: ConnectionState,
    banner: Option<Banner>,
    auto_refresh: bool,
    resume: bool,
    schedule: RefreshSchedule,
}

impl Link {
    pub fn new(auto_refresh: bool, timing: RefreshTiming) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            banner: None,
            auto_refresh,
            // The first open behaves like a resume so the switch takes effect on load.
            resume: auto_refresh,
            schedule: RefreshSchedule::new(timing),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn banner(&self) -> Option<Banner> {
        self.banner
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn resume_pending(&self) -> bool {
        self.resume
    }

    pub fn schedule(&self) -> &RefreshSchedule {
        &self.schedule
    }

    pub fn is_refreshing(&self) -> bool {
        self.schedule.is_active()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.schedule.next_deadline()
    }

    pub fn on_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    pub fn on_open(&mut self, now: Instant) {
        self.state = ConnectionState::Connected;
        self.banner = None;
        if std::mem::take(&mut self.resume) && self.auto_refresh {
            self.schedule.start(now);
        }
    }

    pub fn on_close(&mut self) {
        self.suspend();
        self.state = ConnectionState::Reconnecting;
        self.banner = Some(Banner::ConnectionLost);
    }

    /// User-requested close: same teardown as a lost channel, without the banner.
    pub fn on_disconnect(&mut self) {
        self.suspend();
        self.state = ConnectionState::Disconnected;
        self.banner = None;
    }

    pub fn on_error(&mut self) {
        self.banner = Some(Banner::ConnectionError);
    }

    pub fn set_auto_refresh(&mut self, enabled: bool, now: Instant) {
        self.auto_refresh = enabled;
        if !enabled {
            self.schedule.stop();
            self.resume = false;
        } else if self.is_connected() {
            self.schedule.start(now);
        } else {
            self.resume = true;
        }
    }

    /// Refresh requests due at `now`; nothing unless connected.
    pub fn poll(&mut self, now: Instant) -> Vec<ClientCommand> {
        if !self.is_connected() {
            return Vec::new();
        }
        self.schedule.poll(now)
    }

    fn suspend(&mut self) {
        self.resume |= self.schedule.is_active();
        self.schedule.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn running_link(t0: Instant) -> Link {
        let mut link = Link::new(true, RefreshTiming::default());
        link.on_connecting();
        link.on_open(t0);
        link.poll(t0 + ms(600));
        assert!(link.schedule().is_running());
        link
    }

    #[test]
    fn first_open_starts_refresh_when_switch_is_on() {
        let t0 = Instant::now();
        let mut link = Link::new(true, RefreshTiming::default());
        link.on_connecting();
        assert_eq!(link.state(), ConnectionState::Connecting);
        link.on_open(t0);
        assert!(link.is_refreshing());

        let mut off = Link::new(false, RefreshTiming::default());
        off.on_open(t0);
        assert!(!off.is_refreshing());
    }

    #[test]
    fn close_stops_refresh_and_resumes_on_next_open() {
        let t0 = Instant::now();
        let mut link = running_link(t0);

        link.on_close();
        assert!(!link.is_refreshing());
        assert_eq!(link.state(), ConnectionState::Reconnecting);
        assert_eq!(link.banner(), Some(Banner::ConnectionLost));
        assert!(link.poll(t0 + ms(5000)).is_empty());

        link.on_connecting();
        link.on_open(t0 + ms(6000));
        assert!(link.is_refreshing());
        assert_eq!(link.banner(), None);
    }

    #[test]
    fn flapping_keeps_one_trigger_of_each_kind() {
        let t0 = Instant::now();
        let mut link = running_link(t0);

        for i in 1..=20u64 {
            link.on_close();
            assert!(!link.is_refreshing());
            assert_eq!(link.next_deadline(), None);
            link.on_connecting();
            link.on_open(t0 + ms(i * 10));
        }
        link.on_close();
        link.on_close();
        link.on_close();
        assert!(link.resume_pending());

        let t1 = t0 + ms(1000);
        link.on_open(t1);
        let round = link.poll(t1 + ms(600));
        assert_eq!(round.len(), 3);
        let s = link.schedule();
        assert!(s.next_slow().is_some() && s.next_fast().is_some());
        // Starting again while running must not add a second pair of triggers.
        link.set_auto_refresh(true, t1 + ms(700));
        assert_eq!(link.poll(t1 + ms(850)), vec![ClientCommand::GetSystemState]);
    }

    #[test]
    fn switch_turned_off_while_disconnected_prevents_resume() {
        let t0 = Instant::now();
        let mut link = running_link(t0);
        link.on_close();
        link.set_auto_refresh(false, t0 + ms(700));
        link.on_open(t0 + ms(800));
        assert!(!link.is_refreshing());

        // Turning it back on while offline arms the resume instead.
        link.on_close();
        link.set_auto_refresh(true, t0 + ms(900));
        assert!(!link.is_refreshing());
        link.on_open(t0 + ms(1000));
        assert!(link.is_refreshing());
    }

    #[test]
    fn error_only_sets_the_banner() {
        let t0 = Instant::now();
        let mut link = running_link(t0);
        link.on_error();
        assert_eq!(link.state(), ConnectionState::Connected);
        assert!(link.is_refreshing());
        assert_eq!(link.banner().map(Banner::message), Some("Server connection error"));
    }

    #[test]
    fn user_disconnect_has_no_banner() {
        let t0 = Instant::now();
        let mut link = running_link(t0);
        link.on_disconnect();
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.banner(), None);
        assert!(!link.is_refreshing());
        link.on_open(t0 + ms(50));
        assert!(link.is_refreshing());
    }
}
