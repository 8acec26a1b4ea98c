//! ---
//! sfb_section: "03-persistence-logging"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Structured logging context and macros."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---

/// Shared expansion behind the level-specific macros.
#[doc(hidden)]
#[macro_export]
macro_rules! __sfb_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        $crate::tracing::event!(
            $level,
            factory = ctx.factory.unwrap_or_default(),
            system = ctx.system.unwrap_or(""),
            alert_type = ctx.alert_type.unwrap_or(""),
            device = ctx.device.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with bridge context.
#[macro_export]
macro_rules! sfb_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__sfb_event!($crate::tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__sfb_event!($crate::tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with bridge context.
#[macro_export]
macro_rules! sfb_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__sfb_event!($crate::tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__sfb_event!($crate::tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with bridge context.
#[macro_export]
macro_rules! sfb_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__sfb_event!($crate::tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__sfb_event!($crate::tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with bridge context.
#[macro_export]
macro_rules! sfb_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__sfb_event!($crate::tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__sfb_event!($crate::tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
