//! Process-wide tracing setup.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "finetl=debug,finetl_core=debug,info"
    } else {
        "info"
    }
}

/// Install a formatted subscriber on stderr. `RUST_LOG` takes precedence over
/// `verbose`. Returns false if a global subscriber was already set.
pub fn init(verbose: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
