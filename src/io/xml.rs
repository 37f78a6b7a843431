//! XML configuration save/load.
//!
//! The on-wire layout is a `<Simulation>` document holding the units,
//! per-id properties, particle data and the dynamics block (interactions
//! with their capture maps, globals, locals, system events, boundary
//! conditions and the dynamics type). All values are in reduced units; the
//! `<Units>` element carries the conversion factors.
//!
//! Saving and reloading a configuration reproduces the same document byte
//! for byte (modulo whitespace), which is what the round-trip tests pin.

use crate::core::bc::{Boundary, BoundaryKind};
use crate::core::globals::{GCells, GCellsShearing, GSleep, Global};
use crate::core::interactions::{Dumbbells, HardSphere, Interaction, SquareWell};
use crate::core::locals::{LWall, Local};
use crate::core::math::Vec3;
use crate::core::particle::{Particle, DYNAMIC};
use crate::core::properties::{Properties, Property};
use crate::core::ranges::IdRange;
use crate::core::sim::Simulation;
use crate::core::systems::{AndersenThermostat, SysTicker, System};
use crate::error::{Error, Result};
use quick_xml::events::{BytesEnd, BytesStart, Event as XEvent};
use quick_xml::{Reader, Writer};
use std::path::Path;

/// An in-memory XML element used as the interchange form between plugins
/// and the reader/writer.
#[derive(Debug, Clone)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, key: &str, value: impl ToString) -> Self {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn child(mut self, node: XmlNode) -> Self {
        self.children.push(node);
        self
    }

    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn req_attr(&self, key: &str) -> Result<&str> {
        self.get_attr(key).ok_or_else(|| {
            Error::Config(format!("<{}> is missing the {key} attribute", self.name))
        })
    }

    pub fn parse_attr<T: std::str::FromStr>(&self, key: &str) -> Result<T> {
        let raw = self.req_attr(key)?;
        raw.parse().map_err(|_| {
            Error::Config(format!(
                "<{}> attribute {key} has unparsable value {raw:?}",
                self.name
            ))
        })
    }

    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn req_child(&self, name: &str) -> Result<&XmlNode> {
        self.find(name)
            .ok_or_else(|| Error::Config(format!("<{}> is missing a <{name}> child", self.name)))
    }

    fn vec3_attrs(&self) -> Result<Vec3> {
        Ok(Vec3::new(
            self.parse_attr("x")?,
            self.parse_attr("y")?,
            self.parse_attr("z")?,
        ))
    }

    fn from_vec3(name: &str, v: Vec3) -> XmlNode {
        XmlNode::new(name).attr("x", v.x).attr("y", v.y).attr("z", v.z)
    }
}

/// Parse a document into an element tree (attributes only; text content is
/// not part of the format).
pub fn parse_tree(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event()? {
            XEvent::Start(e) => {
                stack.push(node_from_tag(&e)?);
            }
            XEvent::Empty(e) => {
                let node = node_from_tag(&e)?;
                attach(&mut stack, &mut root, node)?;
            }
            XEvent::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| Error::Config("unbalanced closing tag".into()))?;
                attach(&mut stack, &mut root, node)?;
            }
            XEvent::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::Config("unclosed element at end of document".into()));
    }
    root.ok_or_else(|| Error::Config("empty configuration document".into()))
}

fn node_from_tag(e: &BytesStart<'_>) -> Result<XmlNode> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut node = XmlNode::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::Config(format!("bad attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| Error::Config(format!("bad attribute value: {err}")))?
            .into_owned();
        node.attrs.push((key, value));
    }
    Ok(node)
}

fn attach(stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>, node: XmlNode) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_some() {
                return Err(Error::Config("multiple root elements".into()));
            }
            *root = Some(node);
        }
    }
    Ok(())
}

/// Serialize an element tree with two-space indentation.
pub fn serialize(root: &XmlNode) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_node(&mut writer, root)?;
    let bytes = writer.into_inner();
    String::from_utf8(bytes).map_err(|_| Error::Config("non-UTF8 output document".into()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<()> {
    let mut start = BytesStart::new(node.name.as_str());
    for (k, v) in &node.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if node.children.is_empty() {
        writer.write_event(XEvent::Empty(start))?;
    } else {
        writer.write_event(XEvent::Start(start))?;
        for child in &node.children {
            write_node(writer, child)?;
        }
        writer.write_event(XEvent::End(BytesEnd::new(node.name.as_str())))?;
    }
    Ok(())
}

fn property_to_xml(name: &str, property: &Property) -> XmlNode {
    match property {
        Property::Uniform(v) => XmlNode::new("Property")
            .attr("Name", name)
            .attr("Type", "Uniform")
            .attr("Value", v),
        Property::PerParticle(values) => {
            let mut node = XmlNode::new("Property")
                .attr("Name", name)
                .attr("Type", "PerId");
            for (id, v) in values.iter().enumerate() {
                node = node.child(XmlNode::new("Item").attr("ID", id).attr("Value", v));
            }
            node
        }
    }
}

fn property_from_xml(node: &XmlNode) -> Result<Property> {
    match node.req_attr("Type")? {
        "Uniform" => Ok(Property::Uniform(node.parse_attr("Value")?)),
        "PerId" => {
            let mut values: Vec<(usize, f64)> = Vec::new();
            for item in &node.children {
                values.push((item.parse_attr("ID")?, item.parse_attr("Value")?));
            }
            values.sort_by_key(|&(id, _)| id);
            Ok(Property::PerParticle(
                values.into_iter().map(|(_, v)| v).collect(),
            ))
        }
        other => Err(Error::Config(format!("unknown property type {other:?}"))),
    }
}

/// Render a simulation's full configuration document.
///
/// Particle positions and velocities are written as stored; stream the
/// simulation (`update_all_particles`) first when saving mid-run.
pub fn save_config(sim: &Simulation) -> Result<String> {
    let mut root = XmlNode::new("Simulation");

    root = root.child(XmlNode::new("Units").attr("Length", 1.0).attr("Time", 1.0));

    root = root.child(
        XmlNode::new("Properties")
            .child(property_to_xml("Mass", &sim.properties.mass))
            .child(property_to_xml("Inertia", &sim.properties.inertia)),
    );

    let mut particle_data = XmlNode::new("ParticleData");
    for p in &sim.particles {
        let mut pt = XmlNode::new("Pt").attr("ID", p.id);
        if !p.is_dynamic() {
            pt = pt.attr("Static", "Static");
        }
        pt = pt
            .child(XmlNode::from_vec3("P", p.pos))
            .child(XmlNode::from_vec3("V", p.vel));
        particle_data = particle_data.child(pt);
    }
    root = root.child(particle_data);

    let mut interactions = XmlNode::new("Interactions");
    for i in &sim.interactions {
        interactions = interactions.child(i.output_xml());
    }
    let mut globals = XmlNode::new("Globals");
    for g in &sim.globals {
        globals = globals.child(g.output_xml());
    }
    let mut locals = XmlNode::new("Locals");
    for l in &sim.locals {
        locals = locals.child(l.output_xml());
    }
    let mut systems = XmlNode::new("SystemEvents");
    for s in &sim.systems {
        systems = systems.child(s.output_xml());
    }

    let bc = match sim.boundary.kind {
        BoundaryKind::Rectangular => XmlNode::new("BC").attr("Type", "Rectangular"),
        BoundaryKind::Periodic => XmlNode::new("BC").attr("Type", "Periodic"),
        BoundaryKind::LeesEdwards { shear_rate } => XmlNode::new("BC")
            .attr("Type", "LeesEdwards")
            .attr("Rate", shear_rate),
    }
    .attr("SizeX", sim.boundary.box_size.x)
    .attr("SizeY", sim.boundary.box_size.y)
    .attr("SizeZ", sim.boundary.box_size.z);

    root = root.child(
        XmlNode::new("Dynamics")
            .child(interactions)
            .child(globals)
            .child(locals)
            .child(systems)
            .child(bc)
            .child(XmlNode::new("Liouvillean").attr("Type", "Newtonian")),
    );

    serialize(&root)
}

pub fn save_config_file(sim: &Simulation, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, save_config(sim)?)?;
    Ok(())
}

/// Rebuild a simulation from a configuration document.
pub fn load_config(xml: &str, seed: Option<u64>) -> Result<Simulation> {
    let root = parse_tree(xml)?;
    if root.name != "Simulation" {
        return Err(Error::Config(format!(
            "expected a <Simulation> root, found <{}>",
            root.name
        )));
    }

    let (unit_length, unit_time) = match root.find("Units") {
        Some(units) => (units.parse_attr("Length")?, units.parse_attr("Time")?),
        None => (1.0, 1.0),
    };
    let unit_velocity = unit_length / unit_time;

    let bc_node = root.req_child("Dynamics")?.req_child("BC")?;
    let box_size = Vec3::new(
        bc_node.parse_attr::<f64>("SizeX")? * unit_length,
        bc_node.parse_attr::<f64>("SizeY")? * unit_length,
        bc_node.parse_attr::<f64>("SizeZ")? * unit_length,
    );
    let kind = match bc_node.req_attr("Type")? {
        "Rectangular" => BoundaryKind::Rectangular,
        "Periodic" => BoundaryKind::Periodic,
        "LeesEdwards" => BoundaryKind::LeesEdwards {
            shear_rate: bc_node.parse_attr("Rate")?,
        },
        other => return Err(Error::Config(format!("unknown BC type {other:?}"))),
    };
    let boundary = Boundary::new(kind, box_size)?;

    let liouvillean = root.req_child("Dynamics")?.req_child("Liouvillean")?;
    match liouvillean.req_attr("Type")? {
        "Newtonian" => {}
        other => {
            return Err(Error::Config(format!(
                "unknown Liouvillean type {other:?}"
            )))
        }
    }

    let mut mass = Property::Uniform(1.0);
    let mut inertia = Property::Uniform(1.0);
    if let Some(props) = root.find("Properties") {
        for prop in &props.children {
            match prop.req_attr("Name")? {
                "Mass" => mass = property_from_xml(prop)?,
                "Inertia" => inertia = property_from_xml(prop)?,
                other => {
                    return Err(Error::Config(format!("unknown property name {other:?}")))
                }
            }
        }
    }
    let properties = Properties { mass, inertia };

    let mut particles = Vec::new();
    for (index, pt) in root.req_child("ParticleData")?.children.iter().enumerate() {
        let id: usize = pt.parse_attr("ID")?;
        if id != index {
            return Err(Error::Config(format!(
                "particle ids must be dense and ordered: position {index} holds id {id}"
            )));
        }
        let pos = pt.req_child("P")?.vec3_attrs()? * unit_length;
        let vel = pt.req_child("V")?.vec3_attrs()? * unit_velocity;
        let mut particle = Particle::new(id, pos, vel)?;
        if pt.get_attr("Static").is_some() {
            particle.clear_state(DYNAMIC);
        }
        particles.push(particle);
    }

    let mut sim = Simulation::new(particles, boundary, properties, seed)?;

    let dynamics_node = root.req_child("Dynamics")?;
    if let Some(interactions) = dynamics_node.find("Interactions") {
        for node in &interactions.children {
            sim.add_interaction(load_interaction(node, unit_length)?);
        }
    }
    if let Some(globals) = dynamics_node.find("Globals") {
        for node in &globals.children {
            sim.add_global(load_global(node, unit_velocity)?);
        }
    }
    if let Some(locals) = dynamics_node.find("Locals") {
        for node in &locals.children {
            sim.add_local(load_local(node, unit_length)?);
        }
    }
    if let Some(systems) = dynamics_node.find("SystemEvents") {
        for node in &systems.children {
            sim.add_system(load_system(node, unit_time)?);
        }
    }

    Ok(sim)
}

pub fn load_config_file(path: impl AsRef<Path>, seed: Option<u64>) -> Result<Simulation> {
    let xml = std::fs::read_to_string(path)?;
    load_config(&xml, seed)
}

fn load_capture_map(
    node: &XmlNode,
    map: &mut crate::core::capture::CaptureMap,
) -> Result<()> {
    if let Some(capture) = node.find("CaptureMap") {
        for pair in &capture.children {
            map.add(pair.parse_attr("ID1")?, pair.parse_attr("ID2")?);
        }
    }
    Ok(())
}

fn load_interaction(
    node: &XmlNode,
    unit_length: f64,
) -> Result<Box<dyn crate::core::interactions::Interaction>> {
    let name = node.req_attr("Name")?.to_string();
    match node.req_attr("Type")? {
        "HardSphere" => Ok(Box::new(HardSphere::new(
            name,
            node.parse_attr::<f64>("Diameter")? * unit_length,
            node.parse_attr("Elasticity")?,
        )?)),
        "SquareWell" => {
            let mut sw = SquareWell::new(
                name,
                node.parse_attr::<f64>("Diameter")? * unit_length,
                node.parse_attr("Lambda")?,
                node.parse_attr("WellDepth")?,
                node.parse_attr("Elasticity")?,
            )?;
            if let Some(map) = sw.capture_map_mut() {
                load_capture_map(node, map)?;
            }
            Ok(Box::new(sw))
        }
        "Dumbbells" => {
            let mut db = Dumbbells::new(
                name,
                node.parse_attr::<f64>("DiameterA")? * unit_length,
                node.parse_attr::<f64>("DiameterB")? * unit_length,
                node.parse_attr::<f64>("LA")? * unit_length,
                node.parse_attr::<f64>("LB")? * unit_length,
                node.parse_attr("Elasticity")?,
            )?;
            if node.get_attr("UnusedDimension").is_some() {
                db = db.with_unused_dimension(node.parse_attr("UnusedDimension")?);
            }
            if let Some(map) = db.capture_map_mut() {
                load_capture_map(node, map)?;
            }
            Ok(Box::new(db))
        }
        other => Err(Error::Config(format!("unknown interaction type {other:?}"))),
    }
}

fn load_global(
    node: &XmlNode,
    unit_velocity: f64,
) -> Result<Box<dyn crate::core::globals::Global>> {
    let name = node.req_attr("Name")?.to_string();
    match node.req_attr("Type")? {
        "Cells" => {
            let mut cells = GCells::new(name);
            if node.get_attr("Overlink").is_some() {
                cells = cells.with_overlink(node.parse_attr("Overlink")?);
            }
            Ok(Box::new(cells))
        }
        "ShearingCells" => Ok(Box::new(GCellsShearing::new(name))),
        "Sleep" => {
            let mut sleep = GSleep::new(
                name,
                IdRange::All,
                node.parse_attr::<f64>("SleepV")? * unit_velocity,
            )?;
            if node.get_attr("Converge").is_some() {
                sleep = sleep.with_converge(node.parse_attr("Converge")?);
            }
            if node.get_attr("WakeV").is_some() {
                sleep = sleep.with_wake_velocity(node.parse_attr("WakeV")?);
            }
            Ok(Box::new(sleep))
        }
        other => Err(Error::Config(format!("unknown global type {other:?}"))),
    }
}

fn load_local(node: &XmlNode, unit_length: f64) -> Result<Box<dyn crate::core::locals::Local>> {
    let name = node.req_attr("Name")?.to_string();
    match node.req_attr("Type")? {
        "Wall" => Ok(Box::new(LWall::new(
            name,
            node.req_child("Origin")?.vec3_attrs()? * unit_length,
            node.req_child("Normal")?.vec3_attrs()?,
            node.parse_attr("Elasticity")?,
            IdRange::All,
        )?)),
        other => Err(Error::Config(format!("unknown local type {other:?}"))),
    }
}

fn load_system(node: &XmlNode, unit_time: f64) -> Result<Box<dyn crate::core::systems::System>> {
    let name = node.req_attr("Name")?.to_string();
    match node.req_attr("Type")? {
        "Andersen" => {
            let mut thermo = AndersenThermostat::new(
                name,
                IdRange::All,
                node.parse_attr::<f64>("MFT")? * unit_time,
                node.parse_attr("Temperature")?,
            )?;
            if node.get_attr("SetPoint").is_some() && node.get_attr("SetFrequency").is_some() {
                thermo = thermo
                    .with_tuning(node.parse_attr("SetPoint")?, node.parse_attr("SetFrequency")?);
            }
            Ok(Box::new(thermo))
        }
        "Ticker" => Ok(Box::new(SysTicker::new(
            name,
            node.parse_attr::<f64>("Period")? * unit_time,
        )?)),
        other => Err(Error::Config(format!("unknown system type {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_round_trip() -> Result<()> {
        let doc = XmlNode::new("Simulation")
            .child(XmlNode::new("Units").attr("Length", 1.0).attr("Time", 1.0))
            .child(XmlNode::new("ParticleData").child(
                XmlNode::new("Pt").attr("ID", 0).child(
                    XmlNode::new("P").attr("x", 0.25).attr("y", -1.5).attr("z", 0.0),
                ),
            ));
        let text = serialize(&doc)?;
        let back = parse_tree(&text)?;
        assert_eq!(back.name, "Simulation");
        let pt = back.req_child("ParticleData")?.req_child("Pt")?;
        assert_eq!(pt.get_attr("ID"), Some("0"));
        assert_eq!(pt.req_child("P")?.parse_attr::<f64>("x")?, 0.25);
        Ok(())
    }

    #[test]
    fn missing_attribute_is_a_config_error() {
        let node = XmlNode::new("Interaction").attr("Type", "HardSphere");
        let err = node.req_attr("Diameter").unwrap_err();
        assert!(err.to_string().contains("Diameter"));
    }

    #[test]
    fn malformed_document_is_rejected() {
        assert!(parse_tree("<Simulation><Open></Simulation>").is_err());
        assert!(parse_tree("").is_err());
    }

    #[test]
    fn unknown_plugin_type_is_rejected() {
        let node = XmlNode::new("Interaction")
            .attr("Type", "LennardJones")
            .attr("Name", "lj");
        assert!(load_interaction(&node, 1.0).is_err());
    }
}
