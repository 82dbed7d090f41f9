use std::collections::{BTreeSet, HashMap};

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::catalog::builtin_operations;
use super::error::RegistryError;
use super::operation::{Operation, Server};

/// Semantic type of a single parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    /// String restricted to a fixed set of values
    Enum(Vec<String>),
    /// `{"latitude": .., "longitude": ..}` or `[lat, lon]`
    Coordinate,
    /// Ordered list of coordinates with an item-count window
    CoordinateList { min: usize, max: usize },
}

impl ParamType {
    fn json_schema(&self) -> Value {
        match self {
            ParamType::String => json!({"type": "string"}),
            ParamType::Number => json!({"type": "number"}),
            ParamType::Integer => json!({"type": "integer"}),
            ParamType::Boolean => json!({"type": "boolean"}),
            ParamType::Enum(values) => json!({"type": "string", "enum": values}),
            ParamType::Coordinate => coordinate_schema(),
            ParamType::CoordinateList { min, max } => json!({
                "type": "array",
                "items": coordinate_schema(),
                "minItems": min,
                "maxItems": max,
            }),
        }
    }
}

fn coordinate_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "latitude": {"type": "number", "minimum": -90, "maximum": 90},
            "longitude": {"type": "number", "minimum": -180, "maximum": 180}
        },
        "required": ["latitude", "longitude"]
    })
}

/// One declared parameter of an operation
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub default: Option<Value>,
    /// Inclusive numeric bounds, checked for `Number` and `Integer`
    pub range: Option<(f64, f64)>,
    pub description: String,
}

impl ParameterSpec {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: true,
            default: None,
            range: None,
            description: description.to_string(),
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    fn json_schema(&self) -> Value {
        let mut schema = self.param_type.json_schema();
        if let Value::Object(obj) = &mut schema {
            obj.insert("description".into(), Value::String(self.description.clone()));
            if let Some(default) = &self.default {
                obj.insert("default".into(), default.clone());
            }
            if let Some((min, max)) = self.range {
                obj.insert("minimum".into(), json!(min));
                obj.insert("maximum".into(), json!(max));
            }
        }
        schema
    }
}

/// Declaration of one callable operation. Built at startup, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    pub server: Server,
    pub operation: Operation,
    pub parameters: Vec<ParameterSpec>,
    pub description: String,
}

impl OperationSpec {
    pub fn new(operation: Operation, description: &str, parameters: Vec<ParameterSpec>) -> Self {
        Self {
            server: operation.server(),
            operation,
            parameters,
            description: description.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.operation.name()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// JSON Schema for the argument object, parameters in declaration order
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            properties.insert(param.name.clone(), param.json_schema());
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Catalog of every operation the agent may call.
///
/// Populated once during startup through `&mut self`; afterwards it is shared
/// behind an `Arc` and only read, so it needs no synchronization.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    specs: Vec<OperationSpec>,
    index: HashMap<(Server, Operation), usize>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the nine geocoding/routing/weather operations
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for spec in builtin_operations() {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    /// Register a new operation
    pub fn register(&mut self, spec: OperationSpec) -> Result<(), RegistryError> {
        let key = (spec.server, spec.operation);
        if self.index.contains_key(&key) {
            return Err(RegistryError::DuplicateOperation {
                server: spec.server.to_string(),
                operation: spec.operation.to_string(),
            });
        }

        info!(target: "operation_registry", server = %spec.server, operation = %spec.operation, "Registering operation");
        self.index.insert(key, self.specs.len());
        self.specs.push(spec);
        Ok(())
    }

    /// All operations in registration order
    pub fn list(&self) -> &[OperationSpec] {
        &self.specs
    }

    pub fn lookup(&self, server: Server, operation: Operation) -> Result<&OperationSpec, RegistryError> {
        let found = self
            .index
            .get(&(server, operation))
            .and_then(|&i| self.specs.get(i));
        if found.is_none() {
            debug!(target: "operation_registry", server = %server, operation = %operation, "Lookup miss");
        }
        found.ok_or_else(|| RegistryError::NotFound {
            server: server.to_string(),
            operation: operation.to_string(),
        })
    }

    /// Servers that have at least one registered operation
    pub fn servers(&self) -> BTreeSet<Server> {
        self.specs.iter().map(|s| s.server).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(op: Operation) -> OperationSpec {
        OperationSpec::new(
            op,
            "test operation",
            vec![ParameterSpec::required("address", ParamType::String, "where")],
        )
    }

    #[test]
    fn lookup_returns_registered_spec() {
        let mut registry = OperationRegistry::new();
        let original = spec(Operation::Geocode);
        registry.register(original.clone()).unwrap();

        let found = registry.lookup(Server::Geocoding, Operation::Geocode).unwrap();
        assert_eq!(found, &original);
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = OperationRegistry::new();
        registry.register(spec(Operation::Geocode)).unwrap();
        let err = registry.register(spec(Operation::Geocode)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateOperation { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_misses_are_not_found() {
        let registry = OperationRegistry::new();
        let err = registry
            .lookup(Server::Weather, Operation::GetWeather)
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));

        // operation exists but under another server
        let mut registry = OperationRegistry::new();
        registry.register(spec(Operation::Geocode)).unwrap();
        assert!(registry.lookup(Server::Routing, Operation::Geocode).is_err());
    }

    #[test]
    fn list_preserves_registration_order() {
        let mut registry = OperationRegistry::new();
        for op in [Operation::GetWeather, Operation::Geocode, Operation::FindNearby] {
            registry.register(spec(op)).unwrap();
        }
        let names: Vec<_> = registry.list().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["get_weather", "geocode", "find_nearby"]);
    }

    #[test]
    fn parameters_schema_lists_required_and_defaults() {
        let spec = OperationSpec::new(
            Operation::WeatherForecast,
            "forecast",
            vec![
                ParameterSpec::required("location", ParamType::Coordinate, "point"),
                ParameterSpec::optional("days", ParamType::Integer, "how many days")
                    .with_default(json!(7))
                    .with_range(1.0, 16.0),
            ],
        );
        let schema = spec.parameters_schema();
        assert_eq!(schema["required"], json!(["location"]));
        assert_eq!(schema["properties"]["days"]["default"], 7);
        assert_eq!(schema["properties"]["days"]["maximum"], 16.0);
        assert_eq!(schema["properties"]["location"]["type"], "object");
        assert_eq!(schema["additionalProperties"], false);
    }
}
