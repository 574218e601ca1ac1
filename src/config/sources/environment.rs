//! Environment source: JANITOR__SECTION__KEY, e.g. JANITOR__ADMIN__TOKEN

use config::Environment;

pub fn source() -> Environment {
    Environment::with_prefix("JANITOR")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
