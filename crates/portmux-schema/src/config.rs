/// Controls command schema validation behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// When true, object schemas reject properties they do not declare.
    ///
    /// Command payloads are flat objects, so this is applied to the schema
    /// root only.
    pub strict_mode: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { strict_mode: false }
    }
}
