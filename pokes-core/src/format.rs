use std::time::Duration;

/// Latency rendered as a single rounded component in one of: us, ms, s.
pub fn format_latency(d: Duration) -> String {
    let total_ns = d.as_nanos();

    const NS_PER_US: u128 = 1_000;
    const NS_PER_MS: u128 = 1_000_000;
    const NS_PER_S: u128 = 1_000_000_000;

    if total_ns >= NS_PER_S {
        return format!("{:.2}s", d.as_secs_f64());
    }
    if total_ns >= NS_PER_MS {
        return format!("{:.2}ms", total_ns as f64 / NS_PER_MS as f64);
    }

    format!("{}us", (total_ns + NS_PER_US / 2) / NS_PER_US)
}

/// Wall-clock durations for stage progress: `<1s`, `45s`, `2m 5s`, `1h`. Zero components are left out.
pub fn pretty_duration(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        return "<1s".to_string();
    }

    let secs = d.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

/// Percentile rank label: `50`, `99.9`.
pub fn format_rank(rank: f64) -> String {
    if rank.fract() == 0.0 {
        format!("{rank:.0}")
    } else {
        format!("{rank}")
    }
}
