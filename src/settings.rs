/// Knobs consumed by the simplification core.
///
/// Only `debug_warnings` is read: when set, bail-outs inside the template
/// pass are reported through the error sink as `Severity::Debug` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct Settings {
    pub debug_warnings: bool,
}
