//! Layered configuration: optional file, then `TELVOX__*` environment

use std::path::Path;
use telvox_core::WorkerConfig;

const ENV_PREFIX: &str = "TELVOX";

/// Load the worker configuration.
///
/// `TELVOX__SERVER__PORT=9000` overrides `server.port`, and
/// `TELVOX__ENGINE__KIND=tone` selects the tone engine.
pub fn load(path: Option<&Path>) -> anyhow::Result<WorkerConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
