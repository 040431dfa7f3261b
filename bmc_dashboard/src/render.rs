use crate::client::Snapshot;
use crate::dashboard::GAUGE_MAX_RPM;
use bmc_protocol::ThrottleStatus;
use std::fmt::Write;

const BAR_WIDTH: usize = 20;

/// Plain-text dashboard panel.
pub fn render(snap: &Snapshot) -> String {
    let mut out = String::new();
    let dash = &snap.dashboard;

    let refresh = match (snap.auto_refresh, snap.refreshing) {
        (true, true) => "on",
        (true, false) => "on (paused)",
        (false, _) => "off",
    };
    let _ = writeln!(out, "== BMC [{}] auto-refresh {refresh}", snap.connection.label());
    if let Some(banner) = snap.banner {
        let _ = writeln!(out, "!! {}", banner.message());
    }

    if let Some(info) = &dash.info {
        let _ = write!(out, "model  {}  mem {} MB", info.model, info.total_mem_mb);
        if let (Some(cpu), Some(gpu)) = (info.cpu_mem_mb, info.gpu_mem_mb) {
            let _ = write!(out, " (cpu {cpu} / gpu {gpu})");
        }
        out.push('\n');
    }

    if let Some(stats) = &dash.stats {
        let _ = write!(
            out,
            "cpu    {:.1} C / {:.1} F  up {}",
            stats.cpu_temp.celsius,
            stats.cpu_temp.fahrenheit,
            if stats.uptime.is_empty() { "-" } else { stats.uptime.as_str() }
        );
        if let Some(v) = stats.volts {
            let _ = write!(out, "  {v:.2} V");
        }
        out.push('\n');
        let flags: Vec<String> = stats
            .throttling
            .iter()
            .map(|(c, s)| format!("{} {}", c.label(), status_mark(*s)))
            .collect();
        let _ = writeln!(out, "flags  {}", flags.join(" | "));
    }

    for (i, fan) in dash.fans.iter().enumerate() {
        match fan {
            Some(f) => {
                let _ = writeln!(
                    out,
                    "fan {}  {} {:>5.0} rpm  {:>3}%  {:?}",
                    i + 1,
                    bar(f.rpm),
                    f.rpm,
                    f.duty_cycle,
                    f.zone
                );
            }
            None => {
                let _ = writeln!(out, "fan {}  -", i + 1);
            }
        }
    }

    if let Some(climate) = &dash.climate {
        let _ = writeln!(
            out,
            "air    {:.1} C / {:.1} F  {:.1}% rh",
            climate.temperature.celsius, climate.temperature.fahrenheit, climate.humidity
        );
    }
    if let Some(power) = dash.power {
        let _ = writeln!(out, "power  {}  ok {}", power.state_label(), power.ok_label());
    }
    out
}

fn status_mark(status: ThrottleStatus) -> &'static str {
    match status {
        ThrottleStatus::Clear => "ok",
        ThrottleStatus::Occurred => "was",
        ThrottleStatus::Active => "NOW",
    }
}

fn bar(rpm: f64) -> String {
    let filled = ((rpm / GAUGE_MAX_RPM).clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{Dashboard, FanView, PowerView, RpmZone};
    use crate::link::{Banner, ConnectionState};

    #[test]
    fn renders_banner_fans_and_power() {
        let mut dashboard = Dashboard::new(2);
        dashboard.fans[0] = Some(FanView {
            rpm: 1500.0,
            duty_cycle: 40,
            zone: RpmZone::Normal,
        });
        dashboard.power = Some(PowerView { on: true, ok: false });
        let snap = Snapshot {
            connection: ConnectionState::Reconnecting,
            banner: Some(Banner::ConnectionLost),
            auto_refresh: true,
            refreshing: false,
            dashboard,
        };

        let text = render(&snap);
        assert!(text.contains("[reconnecting] auto-refresh on (paused)"));
        assert!(text.contains("Lost connection to the server. Re-connecting..."));
        assert!(text.contains("[##########..........]  1500 rpm   40%"));
        assert!(text.contains("fan 2  -"));
        assert!(text.contains("power  On  ok No"));
    }
}
