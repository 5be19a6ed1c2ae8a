//! Log output for the ledger server.
//!
//! Stream lifecycles log under the `actions` target (one `stream finished`
//! line per connection, inside a `drive{topic=..}` span). Per-request HTTP
//! traces come from `tower_http` and stay quiet unless asked for.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Server and engine at `info`, HTTP request traces at `warn`.
const DEFAULT_FILTER: &str = "ledger_api=info,actions=info,tower_http=warn";

/// Install the global subscriber. `RUST_LOG` replaces [`DEFAULT_FILTER`]
/// entirely, e.g. `RUST_LOG=actions=debug,tower_http=debug` to see every
/// wake-up and request.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact(),
        )
        .init();
}
