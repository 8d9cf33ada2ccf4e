//! Fatal-error reporting capability consumed from the embedder.

/// Receives unrecoverable conditions detected by the handle layer.
///
/// `signal` is called once per detected failure, before the failing
/// operation returns its error. Implementations must not call back into
/// the isolate that reported the failure: the isolate's storage mutex may
/// be held.
pub trait FatalErrorHandler: Send + Sync {
    /// Report a fatal condition at `location` (the API entry point name).
    fn signal(&self, location: &str, message: &str);

    /// Whether the embedding engine has already died for reasons outside
    /// this layer. Checked before persistent handles are created.
    fn engine_dead(&self) -> bool {
        false
    }
}

/// Default handler: logs through `tracing` and otherwise does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFatalHandler;

impl FatalErrorHandler for LogFatalHandler {
    fn signal(&self, location: &str, message: &str) {
        tracing::error!(location, message, "fatal handle error");
    }
}
