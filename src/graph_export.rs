//! Snapshot export of an object graph for debugging and visualization.
//!
//! [`ObjectGraph::snapshot`] captures every object with its status and every
//! dependency link. The snapshot renders to Graphviz DOT or Mermaid without
//! extra dependencies; JSON and YAML need the `graph-export` feature.

#[cfg(feature = "graph-export")]
use serde::{Deserialize, Serialize};

use crate::error::LifecycleResult;
use crate::object::{ObjectGraph, ObjectStatus};
use crate::state::LifecycleState;

/// One object of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "graph-export", derive(Serialize, Deserialize))]
pub struct ObjectNode {
    pub index: u32,
    pub generation: u32,
    /// Full type path of the object.
    pub type_name: String,
    pub status: ObjectStatus,
}

impl ObjectNode {
    fn node_id(&self) -> String {
        format!("o{}v{}", self.index, self.generation)
    }

    fn label(&self) -> &str {
        short(&self.type_name)
    }
}

/// One dependency link: `source` holds `target` through `member`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "graph-export", derive(Serialize, Deserialize))]
pub struct LinkEdge {
    /// Node id of the dependent.
    pub source: String,
    /// Node id of the dependency.
    pub target: String,
    pub member: String,
    /// Raw `LinkKind` bits.
    pub kind: u32,
    pub required: bool,
    pub collection: bool,
}

/// Objects and links of a graph at one point in time.
///
/// ```rust
/// use ferrous_lifecycle::{BindTable, Lifecycle, ObjectGraph, ServiceBinding, Shared};
///
/// struct Store;
/// impl Lifecycle for Store {}
///
/// #[derive(Default)]
/// struct Cart {
///     store: Option<Shared<Store>>,
/// }
///
/// impl Lifecycle for Cart {
///     fn declare_bindings(table: &mut BindTable<Self>) {
///         table.service("store", ServiceBinding, |c: &mut Cart| &mut c.store);
///     }
/// }
///
/// let mut graph = ObjectGraph::new();
/// graph.insert(Store);
/// let cart = graph.insert(Cart::default());
/// graph.attach(cart)?;
///
/// let snapshot = graph.snapshot();
/// assert_eq!(snapshot.objects.len(), 2);
/// assert_eq!(snapshot.links.len(), 1);
/// assert!(snapshot.to_dot().contains("label=\"store\""));
/// # Ok::<(), ferrous_lifecycle::LifecycleError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "graph-export", derive(Serialize, Deserialize))]
pub struct GraphSnapshot {
    /// RFC 3339 capture time, with the `graph-export` feature.
    pub generated_at: Option<String>,
    pub objects: Vec<ObjectNode>,
    pub links: Vec<LinkEdge>,
}

impl ObjectGraph {
    /// Captures the current objects and links, in slot order.
    pub fn snapshot(&self) -> GraphSnapshot {
        let objects = self
            .objects
            .iter()
            .map(|(handle, entry)| ObjectNode {
                index: handle.index,
                generation: handle.generation,
                type_name: entry.key.name().to_string(),
                status: entry.core.status(),
            })
            .collect();
        let links = self
            .links()
            .into_iter()
            .map(|link| LinkEdge {
                source: format!("o{}v{}", link.source.index(), link.source.generation()),
                target: format!("o{}v{}", link.target.index(), link.target.generation()),
                member: link.member.to_string(),
                kind: link.kind.bits(),
                required: link.required,
                collection: link.collection,
            })
            .collect();

        GraphSnapshot {
            generated_at: timestamp(),
            objects,
            links,
        }
    }
}

#[cfg(feature = "graph-export")]
fn timestamp() -> Option<String> {
    Some(chrono::Utc::now().to_rfc3339())
}

#[cfg(not(feature = "graph-export"))]
fn timestamp() -> Option<String> {
    None
}

fn short(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    match base.rfind("::") {
        Some(pos) => &type_name[pos + 2..],
        None => type_name,
    }
}

fn fill(state: LifecycleState) -> &'static str {
    match state {
        LifecycleState::Activated => "palegreen",
        LifecycleState::Deactivated => "lightyellow",
        LifecycleState::Detached => "lightgrey",
        LifecycleState::Destroyed => "salmon",
    }
}

impl GraphSnapshot {
    /// Number of objects in `state`.
    pub fn count_in(&self, state: LifecycleState) -> usize {
        self.objects
            .iter()
            .filter(|object| object.status.state == state)
            .count()
    }

    /// Graphviz rendering; edges point from dependent to dependency.
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph ObjectGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=filled];\n\n");

        for object in &self.objects {
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\\n{}\", fillcolor={}];\n",
                object.node_id(),
                object.label(),
                object.status.state,
                fill(object.status.state)
            ));
        }
        output.push('\n');
        for link in &self.links {
            let style = if link.required { "solid" } else { "dashed" };
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\", style={}];\n",
                link.source, link.target, link.member, style
            ));
        }
        output.push_str("}\n");
        output
    }

    /// Mermaid flowchart rendering.
    pub fn to_mermaid(&self) -> String {
        let mut output = String::from("graph LR\n");
        for object in &self.objects {
            output.push_str(&format!(
                "  {}[\"{} ({})\"]\n",
                object.node_id(),
                object.label(),
                object.status.state
            ));
        }
        for link in &self.links {
            let arrow = if link.required { "-->" } else { "-.->" };
            output.push_str(&format!(
                "  {} {}|{}| {}\n",
                link.source, arrow, link.member, link.target
            ));
        }
        output
    }

    #[cfg(feature = "graph-export")]
    pub fn to_json(&self) -> LifecycleResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| crate::LifecycleError::Config(format!("JSON export failed: {err}")))
    }

    #[cfg(feature = "graph-export")]
    pub fn to_yaml(&self) -> LifecycleResult<String> {
        serde_yaml::to_string(self)
            .map_err(|err| crate::LifecycleError::Config(format!("YAML export failed: {err}")))
    }

    /// Checks the snapshot is self-consistent: every link endpoint is one of
    /// the captured objects.
    pub fn validate(&self) -> LifecycleResult<()> {
        let ids: Vec<String> = self.objects.iter().map(ObjectNode::node_id).collect();
        for link in &self.links {
            for endpoint in [&link.source, &link.target] {
                if !ids.contains(endpoint) {
                    return Err(crate::LifecycleError::Config(format!(
                        "link {} references unknown object {}",
                        link.member, endpoint
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{optional, BindTable, ServiceBinding};
    use crate::object::{Lifecycle, Shared};

    struct Engine;
    impl Lifecycle for Engine {}

    #[derive(Default)]
    struct Car {
        engine: Option<Shared<Engine>>,
    }

    impl Lifecycle for Car {
        fn declare_bindings(table: &mut BindTable<Self>) {
            table.service("engine", optional(ServiceBinding), |c: &mut Car| &mut c.engine);
        }
    }

    fn wired() -> ObjectGraph {
        let mut graph = ObjectGraph::new();
        graph.insert(Engine);
        let car = graph.insert(Car::default());
        graph.force_state(car, LifecycleState::Activated, false).unwrap();
        graph
    }

    #[test]
    fn snapshot_captures_states_and_links() {
        let snapshot = wired().snapshot();
        assert_eq!(snapshot.count_in(LifecycleState::Activated), 1);
        assert_eq!(snapshot.count_in(LifecycleState::Detached), 1);
        assert_eq!(snapshot.links.len(), 1);
        assert!(!snapshot.links[0].required);
        snapshot.validate().unwrap();
    }

    #[test]
    fn renderers_use_short_names_and_optional_styles() {
        let snapshot = wired().snapshot();
        let dot = snapshot.to_dot();
        assert!(dot.contains("label=\"Car\\nActivated\""));
        assert!(dot.contains("style=dashed"));

        let mermaid = snapshot.to_mermaid();
        assert!(mermaid.starts_with("graph LR"));
        assert!(mermaid.contains("-.->|engine|"));
    }

    #[test]
    fn short_names_keep_generic_arguments() {
        assert_eq!(short("app::Cache<alloc::string::String>"), "Cache<alloc::string::String>");
        assert_eq!(short("Plain"), "Plain");
    }

    #[cfg(feature = "graph-export")]
    #[test]
    fn json_export_carries_timestamp() {
        let snapshot = wired().snapshot();
        assert!(snapshot.generated_at.is_some());
        let json = snapshot.to_json().unwrap();
        let back: GraphSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.links, snapshot.links);
    }
}
