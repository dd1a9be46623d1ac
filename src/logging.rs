//! Internal logging helpers for structured storage events.

/// Single logging target for the crate.
pub(crate) const LOG_TARGET: &str = "ringstore";

/// Emit `event=<name> <message>` under [`LOG_TARGET`].
///
/// The `table:` form prefixes the message with `table=<keyspace.name>` so every
/// line produced on behalf of one table can be grepped together.
macro_rules! store_log {
    ($level:expr, table: $table:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: crate::logging::LOG_TARGET, $level) {
            log::log!(
                target: crate::logging::LOG_TARGET,
                $level,
                "event={} table={} {}",
                $event,
                $table,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
    ($level:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: crate::logging::LOG_TARGET, $level) {
            log::log!(
                target: crate::logging::LOG_TARGET,
                $level,
                "event={} {}",
                $event,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
}

pub(crate) use store_log;
