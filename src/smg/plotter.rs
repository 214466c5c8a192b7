//! Renders a scoped memory graph in the dot language.
//!
//! The output is meant for humans only: stack frames and the global scope
//! become clusters, heap objects float freely, values are small circles.

use super::{CLangSmg, ObjectId, SymbolicValue};
use crate::util::sanitize_identifier;
use std::{
    collections::BTreeSet,
    fmt::{self, Write as _},
    fs::File,
    io::Write,
    path::Path,
};

pub struct SmgPlotter<'a> {
    smg: &'a CLangSmg,
    name: &'a str,
}

impl<'a> SmgPlotter<'a> {
    pub fn new(smg: &'a CLangSmg, name: &'a str) -> Self {
        Self { smg, name }
    }

    pub fn write_to_file<P>(&self, path: P) -> Result<(), std::io::Error>
    where
        P: AsRef<Path>,
    {
        let mut f = File::create(path)?;

        write!(f, "{}", self)?;

        f.sync_all()
    }

    fn object_node(&self, f: &mut String, id: ObjectId) -> fmt::Result {
        let graph = self.smg.smg();

        let (label, size, is_null) = match graph.object(id) {
            Some(object) => (object.label(), object.size(), object.is_null()),
            None => return Ok(()),
        };

        let style = if is_null || graph.is_object_valid(id) != Ok(true) {
            "dashed"
        } else {
            "solid"
        };

        writeln!(
            f,
            "    {} [shape=rectangle, style={}, label=\"{} ({}b)\"];",
            object_node_name(id),
            style,
            escape(label),
            size
        )
    }

    fn cluster(&self, f: &mut String, name: &str, label: &str, objects: &[ObjectId]) -> fmt::Result {
        writeln!(f, "  subgraph cluster_{} {{", sanitize_identifier(name))?;
        writeln!(f, "    label=\"{}\";", escape(label))?;

        for id in objects {
            self.object_node(f, *id)?;
        }

        writeln!(f, "  }}")
    }

    fn render(&self) -> Result<String, fmt::Error> {
        let graph = self.smg.smg();
        let mut f = String::new();

        writeln!(f, "digraph {} {{", sanitize_identifier(self.name))?;
        writeln!(f, "  compound=true;")?;

        for (depth, frame) in self.smg.stack_frames().iter().enumerate() {
            let objects = frame.objects().collect::<Vec<_>>();
            let name = format!("frame{}_{}", depth, frame.function().name);

            self.cluster(&mut f, &name, &frame.function().to_string(), &objects)?;
        }

        let globals = self.smg.global_objects().values().copied().collect::<Vec<_>>();
        if !globals.is_empty() {
            self.cluster(&mut f, "globals", "global variables", &globals)?;
        }

        for id in self.smg.heap_objects() {
            self.object_node(&mut f, *id)?;
        }

        let mut drawn_values = BTreeSet::new();

        for edge in graph.has_value_edges() {
            drawn_values.insert(edge.value);
        }
        for edge in graph.points_to_edges() {
            drawn_values.insert(edge.value);
        }

        for value in &drawn_values {
            let label = match graph.explicit_of(*value) {
                Some(explicit) if !value.is_null() => format!("{}\\n={}", value, explicit),
                _ => value.to_string(),
            };

            writeln!(
                f,
                "  {} [shape=circle, label=\"{}\"];",
                value_node_name(*value),
                label
            )?;
        }

        for edge in graph.has_value_edges() {
            writeln!(
                f,
                "  {} -> {} [label=\"[{}]:{}\"];",
                object_node_name(edge.object),
                value_node_name(edge.value),
                edge.offset,
                escape(&edge.ty.to_string())
            )?;
        }

        for edge in graph.points_to_edges() {
            writeln!(
                f,
                "  {} -> {} [style=dotted, label=\"+{}\"];",
                value_node_name(edge.value),
                object_node_name(edge.object),
                edge.offset
            )?;
        }

        writeln!(f, "}}")?;

        Ok(f)
    }
}

impl<'a> fmt::Display for SmgPlotter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.render()?)
    }
}

fn object_node_name(id: ObjectId) -> String {
    format!("object_{}", id.index())
}

fn value_node_name(value: SymbolicValue) -> String {
    format!("value_{}", value.index())
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
