use std::collections::HashMap;

use jsonschema::Validator;
use portmux_wire::{Envelope, Payload};
use serde_json::Value;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};

/// Handler invoked with a validated envelope.
pub type CommandHandler = Box<dyn Fn(&Envelope) + Send + Sync>;

struct CommandEntry {
    path: String,
    validator: Validator,
    handler: CommandHandler,
}

/// Instance-owned registry of command schemas for multiplexed modules.
///
/// Each module (e.g. `"plugin"`) declares entries keyed by a URI-like path
/// (`/request/plugin/send`), a JSON Schema for the payload shape, and a
/// bound handler. Envelopes are validated before any handler runs; handlers
/// are never invoked speculatively.
///
/// The registry is an owned value passed explicitly to its consumers, so
/// two links never share dispatch state.
pub struct CommandRegistry {
    modules: HashMap<String, Vec<CommandEntry>>,
    config: RegistryConfig,
}

impl CommandRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            modules: HashMap::new(),
            config,
        }
    }

    /// The request path for a module operation, e.g. `/request/plugin/send`.
    pub fn request_path(module: &str, op: &str) -> String {
        format!("/request/{module}/{op}")
    }

    /// The response path for a module operation, e.g.
    /// `/response/plugin/receive`.
    pub fn response_path(module: &str, op: &str) -> String {
        format!("/response/{module}/{op}")
    }

    /// The registry path an envelope matches against, derived from its
    /// payload direction.
    pub fn envelope_path(module: &str, payload: &Payload) -> String {
        let op = payload.op_name();
        match payload {
            Payload::Connect { .. }
            | Payload::Write { .. }
            | Payload::Disconnect(_)
            | Payload::Send(_) => Self::request_path(module, op),
            _ => Self::response_path(module, op),
        }
    }

    /// Register a command entry for a module.
    ///
    /// `schema_json` describes the externally tagged payload object, e.g.
    /// `{"send": [0, 1, 2]}` for the plugin send command.
    pub fn register(
        &mut self,
        module: &str,
        path: &str,
        schema_json: &str,
        handler: CommandHandler,
    ) -> Result<()> {
        let entries = self.modules.entry(module.to_string()).or_default();
        if entries.iter().any(|e| e.path == path) {
            return Err(SchemaError::DuplicatePath {
                module: module.to_string(),
                path: path.to_string(),
            });
        }

        let mut schema: Value = serde_json::from_str(schema_json)?;
        if self.config.strict_mode {
            apply_strict_mode(&mut schema);
        }
        let validator =
            jsonschema::validator_for(&schema).map_err(|err| SchemaError::CompileFailed {
                path: path.to_string(),
                message: err.to_string(),
            })?;

        entries.push(CommandEntry {
            path: path.to_string(),
            validator,
            handler,
        });
        Ok(())
    }

    /// Check if a module has registered entries.
    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// Registered paths for a module, in registration order.
    pub fn paths(&self, module: &str) -> Vec<&str> {
        self.modules
            .get(module)
            .map(|entries| entries.iter().map(|e| e.path.as_str()).collect())
            .unwrap_or_default()
    }

    /// Validate an envelope against the module's matching entry without
    /// invoking its handler.
    ///
    /// An entry whose path matches but whose schema rejects the payload is
    /// a "close" candidate and fails with [`SchemaError::SchemaViolation`];
    /// no matching path at all fails with [`SchemaError::UnknownCommand`].
    pub fn validate(&self, module: &str, envelope: &Envelope) -> Result<()> {
        self.lookup(module, envelope).map(|_| ())
    }

    /// Validate an envelope and invoke the matching handler exactly once.
    pub fn dispatch(&self, module: &str, envelope: &Envelope) -> Result<()> {
        let entry = self.lookup(module, envelope)?;
        (entry.handler)(envelope);
        Ok(())
    }

    /// Registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn lookup(&self, module: &str, envelope: &Envelope) -> Result<&CommandEntry> {
        let path = Self::envelope_path(module, &envelope.payload);
        let entry = self
            .modules
            .get(module)
            .and_then(|entries| entries.iter().find(|e| e.path == path))
            .ok_or_else(|| {
                debug!(module, %path, "no command entry for envelope");
                SchemaError::UnknownCommand(module.to_string())
            })?;

        let payload = serde_json::to_value(&envelope.payload)?;
        let mut errors = entry.validator.iter_errors(&payload);
        if let Some(first) = errors.next() {
            let mut detail = first.to_string();
            for err in errors.take(3) {
                detail.push_str("; ");
                detail.push_str(&err.to_string());
            }
            return Err(SchemaError::SchemaViolation {
                path: path.clone(),
                detail,
            });
        }

        Ok(entry)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_strict_mode(schema: &mut Value) {
    if let Value::Object(map) = schema {
        let is_object_schema = matches!(map.get("type"), Some(Value::String(kind)) if kind == "object")
            || map.contains_key("properties")
            || map.contains_key("required");
        if is_object_schema && !map.contains_key("additionalProperties") {
            map.insert("additionalProperties".to_string(), Value::Bool(false));
        }
    }
}
