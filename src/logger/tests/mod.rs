use std::sync::Mutex;

/// Serialises tests that swap the global logger.
pub(crate) static GLOBAL_LOGGER_GUARD: Mutex<()> = Mutex::new(());
