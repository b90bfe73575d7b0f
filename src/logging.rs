//! Logging setup for the binaries. Logs go to stderr so stdout stays free for
//! reports and shim output.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` takes precedence over `verbose`.
///
/// Calling this twice is harmless; the second call is ignored.
pub fn init(verbose: bool) {
    let default = if verbose {
        "amqp_interop=debug"
    } else {
        "amqp_interop=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
