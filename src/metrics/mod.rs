//! Metrics for the tap.
//!
//! Events in [`events`] record counters and histograms through the `metrics`
//! facade. The tap installs no exporter, so they are no-ops unless an
//! embedding application installs a recorder.

pub mod events;

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding metric.
///
/// # Example
///
/// ```ignore
/// use tap_s3_csv::metrics::events::RecordsExtracted;
///
/// emit!(RecordsExtracted { stream: "orders".into(), count: 100 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
