// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const QUIET_DEPENDENCIES: &str =
    "hyper=info,hyper_util=info,reqwest=info,alloy_transport_http=info,alloy_rpc_client=info";

/// A bare level ("debug") gets the transport crates pinned to `info`;
/// directive strings (containing ',' or '=') pass through untouched.
pub fn filter_spec(log_level: &str) -> String {
    let normalized = log_level.trim();
    if normalized.is_empty() {
        return format!("info,{QUIET_DEPENDENCIES}");
    }
    if normalized.contains(',') || normalized.contains('=') {
        normalized.to_string()
    } else {
        format!("{normalized},{QUIET_DEPENDENCIES}")
    }
}

/// Installs the global subscriber. A second call is a no-op.
pub fn setup_logging(log_level: &str, json_format: bool) {
    let spec = filter_spec(log_level);
    let filter = EnvFilter::from_str(&spec).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = if json_format {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false);
        subscriber.with(json_layer).try_init().is_ok()
    } else {
        let fmt_layer = fmt::layer().with_target(true).compact();
        subscriber.with(fmt_layer).try_init().is_ok()
    };
    if !installed {
        return;
    }

    let base = spec.split(',').next().unwrap_or("info");
    tracing::info!(
        target: "config",
        base,
        filter = %spec,
        format = if json_format { "json" } else { "compact" },
        "Logging initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_quiets_transport_crates() {
        let spec = filter_spec(" debug ");
        assert!(spec.starts_with("debug,"));
        assert!(spec.contains("alloy_transport_http=info"));
    }

    #[test]
    fn directive_strings_pass_through() {
        assert_eq!(filter_spec("warn,rebalance=debug"), "warn,rebalance=debug");
        assert!(filter_spec("").starts_with("info,"));
    }
}
