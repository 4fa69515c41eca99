//! Execution targets a task renders against

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use groundwork_core::{EngineError, Result};

/// The closed set of execution backends.
///
/// Every task supplies one render method per variant, so support for each
/// enabled target is checked at compile time rather than discovered at
/// render time.
pub enum Target {
    /// Mutate live cloud state through the provider API
    Api(ApiTarget),
    /// Accumulate a declarative resource document; never calls a live API
    Text(TextTarget),
}

impl Target {
    /// Whether this is the text-emission target. In text mode the engine
    /// skips `find` entirely: actual state is treated as absent so every
    /// resource is emitted exactly once, in dependency order.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    pub fn as_api(&self) -> Option<&ApiTarget> {
        match self {
            Self::Api(t) => Some(t),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextTarget> {
        match self {
            Self::Text(t) => Some(t),
            Self::Api(_) => None,
        }
    }
}

/// Live-API execution backend.
///
/// Holds the injected provider client as an opaque handle; tasks know
/// which concrete client they need and downcast at the seam.
pub struct ApiTarget {
    cloud: Arc<dyn Any + Send + Sync>,
}

impl ApiTarget {
    pub fn new(cloud: Arc<dyn Any + Send + Sync>) -> Self {
        Self { cloud }
    }

    /// Typed access to the provider client
    pub fn cloud<C: Any + Send + Sync>(&self) -> Result<Arc<C>> {
        self.cloud
            .clone()
            .downcast::<C>()
            .map_err(|_| EngineError::other("provider client has unexpected type"))
    }
}

/// An attribute value in an emitted resource record.
///
/// `Reference` is a symbolic cross-reference to another emitted record,
/// resolved by the sink, not by this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
    Reference {
        resource_type: String,
        name: String,
        attribute: String,
    },
}

impl AttrValue {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Symbolic reference to an attribute of another emitted record
    pub fn reference(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self::Reference {
            resource_type: resource_type.into(),
            name: name.into(),
            attribute: attribute.into(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// One emitted declarative resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub resource_type: String,
    pub name: String,
    pub attributes: BTreeMap<String, AttrValue>,
}

/// Collaborator seam for the infra-as-code sink: an ordered stream of
/// resource records plus a flat output-variable registry. The concrete
/// file/block syntax is the sink's business.
pub trait DocumentSink {
    fn resource(&mut self, record: &ResourceRecord) -> Result<()>;
    fn outputs(&mut self, outputs: &BTreeMap<String, AttrValue>) -> Result<()>;
}

/// Text-emission backend: accumulates resource records in render order
pub struct TextTarget {
    resources: Mutex<Vec<ResourceRecord>>,
    outputs: Mutex<BTreeMap<String, AttrValue>>,
}

impl TextTarget {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(Vec::new()),
            outputs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Append a resource record. Emitting the same (type, name) twice is an
    /// engine bug: in text mode every task renders exactly once.
    pub fn render_resource(
        &self,
        resource_type: impl Into<String>,
        name: impl Into<String>,
        attributes: BTreeMap<String, AttrValue>,
    ) -> Result<()> {
        let record = ResourceRecord {
            resource_type: resource_type.into(),
            name: name.into(),
            attributes,
        };
        let mut resources = self.resources.lock().unwrap();
        if resources
            .iter()
            .any(|r| r.resource_type == record.resource_type && r.name == record.name)
        {
            return Err(EngineError::other(format!(
                "resource {}.{} rendered twice",
                record.resource_type, record.name
            )));
        }
        resources.push(record);
        Ok(())
    }

    /// Register an output variable. Re-registering the same value is a
    /// no-op; a conflicting value is an error.
    pub fn add_output(&self, name: impl Into<String>, value: AttrValue) -> Result<()> {
        let name = name.into();
        let mut outputs = self.outputs.lock().unwrap();
        if let Some(existing) = outputs.get(&name) {
            if *existing != value {
                return Err(EngineError::other(format!(
                    "conflicting values for output {name}"
                )));
            }
            return Ok(());
        }
        outputs.insert(name, value);
        Ok(())
    }

    /// Snapshot of emitted records, in render order
    pub fn resources(&self) -> Vec<ResourceRecord> {
        self.resources.lock().unwrap().clone()
    }

    /// Snapshot of the output-variable registry
    pub fn outputs(&self) -> BTreeMap<String, AttrValue> {
        self.outputs.lock().unwrap().clone()
    }

    /// Stream the accumulated document into a sink
    pub fn write_to(&self, sink: &mut dyn DocumentSink) -> Result<()> {
        for record in self.resources.lock().unwrap().iter() {
            sink.resource(record)?;
        }
        sink.outputs(&self.outputs.lock().unwrap())
    }
}

impl Default for TextTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCloud {
        region: &'static str,
    }

    #[test]
    fn test_cloud_downcast() {
        let target = ApiTarget::new(Arc::new(FakeCloud { region: "us-east-1" }));
        let cloud = target.cloud::<FakeCloud>().unwrap();
        assert_eq!(cloud.region, "us-east-1");
    }

    #[test]
    fn test_cloud_downcast_wrong_type() {
        let target = ApiTarget::new(Arc::new(FakeCloud { region: "us-east-1" }));
        assert!(target.cloud::<String>().is_err());
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let target = TextTarget::new();
        target
            .render_resource("aws_subnet", "a", BTreeMap::new())
            .unwrap();
        assert!(target
            .render_resource("aws_subnet", "a", BTreeMap::new())
            .is_err());
        // Same name, different type is fine
        target
            .render_resource("aws_vpc", "a", BTreeMap::new())
            .unwrap();
    }

    #[test]
    fn test_output_conflicts() {
        let target = TextTarget::new();
        target
            .add_output("cluster_name", AttrValue::string("k8s.local"))
            .unwrap();
        // Identical re-registration is fine
        target
            .add_output("cluster_name", AttrValue::string("k8s.local"))
            .unwrap();
        assert!(target
            .add_output("cluster_name", AttrValue::string("other"))
            .is_err());
    }

    #[test]
    fn test_write_to_preserves_render_order() {
        #[derive(Default)]
        struct CollectingSink {
            names: Vec<String>,
            outputs: usize,
        }

        impl DocumentSink for CollectingSink {
            fn resource(&mut self, record: &ResourceRecord) -> Result<()> {
                self.names
                    .push(format!("{}.{}", record.resource_type, record.name));
                Ok(())
            }

            fn outputs(&mut self, outputs: &BTreeMap<String, AttrValue>) -> Result<()> {
                self.outputs = outputs.len();
                Ok(())
            }
        }

        let target = TextTarget::new();
        target
            .render_resource("aws_vpc", "main", BTreeMap::new())
            .unwrap();
        let mut attrs = BTreeMap::new();
        attrs.insert(
            "vpc_id".to_string(),
            AttrValue::reference("aws_vpc", "main", "id"),
        );
        target.render_resource("aws_subnet", "a", attrs).unwrap();
        target
            .add_output("vpc_id", AttrValue::reference("aws_vpc", "main", "id"))
            .unwrap();

        let mut sink = CollectingSink::default();
        target.write_to(&mut sink).unwrap();
        assert_eq!(sink.names, vec!["aws_vpc.main", "aws_subnet.a"]);
        assert_eq!(sink.outputs, 1);
    }
}
