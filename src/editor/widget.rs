use serde_json::Value;

/// The embedded editing widget, treated as a black box.
///
/// Deltas and content snapshots are opaque values in the widget's own
/// format; convergence of concurrent edits is owned entirely by the widget's
/// delta composition, never by the relay.
pub trait EditorWidget {
    /// Full current document content.
    fn contents(&self) -> Value;

    /// Replace the document wholesale (bootstrap).
    fn set_contents(&mut self, content: Value);

    /// Apply one incremental change.
    fn apply_delta(&mut self, delta: &Value);

    /// Allow local edits.
    fn enable(&mut self);

    /// Block local edits (no peer to converge with).
    fn disable(&mut self);
}
