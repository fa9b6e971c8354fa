/// Errors raised while building a layout spec.
///
/// Decoding never errors: `validate` returns `false` and `get_data` returns
/// `None` for buffers that do not conform.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// `group_start` was called while another group was open.
    #[error("group '{0}' opened inside group '{1}'")]
    NestedGroup(String, String),

    /// `group_end` was called with no open group.
    #[error("group_end without an open group")]
    GroupNotOpen,

    /// The layout ended with a group still open.
    #[error("group '{0}' was never closed")]
    GroupNotClosed(String),

    /// Two targets share the same `(group, name)` address.
    #[error("duplicate target '{name}' in {scope}")]
    DuplicateTarget { scope: String, name: String },

    /// A presence precondition names a target that is not an earlier
    /// top-level target.
    #[error("presence precondition references unknown target '{0}'")]
    UnknownPresenceTarget(String),

    /// A presence precondition's expected bytes cannot match its target.
    #[error("presence expectation for '{target}' is {expected_len} bytes but the target is {target_len}")]
    PresenceLengthMismatch {
        target: String,
        expected_len: usize,
        target_len: usize,
    },
}

pub type Result<T> = std::result::Result<T, LayoutError>;
