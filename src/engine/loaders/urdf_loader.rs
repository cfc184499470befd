//! URDF reader.
//!
//! Only what playback needs is kept: the robot name, the joints with their
//! limits, and every mesh file the document references. Geometry and
//! inertial data are left to the renderer.

use quick_xml::events::{ BytesStart, Event };
use quick_xml::Reader;
use url::Url;

use super::error::ParseError;
use crate::engine::components::loaded_asset::{ JointDescription, JointKind, JointLimit, RobotDescription };

/// Parse a URDF document.
///
/// # Errors
///
/// Returns an error if the XML is malformed, has no `<robot>` element or a
/// joint/mesh element lacks a required attribute.
pub fn parse_urdf(source: &Url, xml: &str) -> Result<RobotDescription, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut robot: Option<RobotDescription> = None;
    let mut current_joint: Option<JointDescription> = None;

    loop {
        let event = reader.read_event().map_err(|e| xml_error(source, &reader, e))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"robot" => {
                        let name = get_attribute_opt(e, "name").unwrap_or_default();
                        robot = Some(RobotDescription::new(name));
                    }
                    b"joint" if robot.is_some() => {
                        // <transmission> also has <joint> children, without a type
                        if let Some(joint) = parse_joint(e)? {
                            if is_empty {
                                push_joint(&mut robot, joint);
                            } else {
                                current_joint = Some(joint);
                            }
                        }
                    }
                    b"limit" => {
                        if let Some(joint) = current_joint.as_mut() {
                            joint.limit = parse_limit(e);
                        }
                    }
                    b"mimic" => {
                        if let Some(joint) = current_joint.as_mut() {
                            joint.mimic = Some(get_attribute(e, "joint")?);
                        }
                    }
                    b"mesh" => {
                        let filename = get_attribute(e, "filename")?;
                        if let Some(robot) = robot.as_mut() {
                            if !robot.mesh_references.contains(&filename) {
                                robot.mesh_references.push(filename);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) if e.name().as_ref() == b"joint" => {
                if let Some(joint) = current_joint.take() {
                    push_joint(&mut robot, joint);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    robot.ok_or_else(|| ParseError::MissingElement {
        element: "robot",
        context: source.to_string(),
    })
}

fn push_joint(robot: &mut Option<RobotDescription>, joint: JointDescription) {
    if let Some(robot) = robot.as_mut() {
        robot.joints.push(joint);
    }
}

fn parse_joint(e: &BytesStart) -> Result<Option<JointDescription>, ParseError> {
    let Some(kind) = get_attribute_opt(e, "type") else {
        return Ok(None);
    };
    let name = get_attribute(e, "name")?;
    let kind = match kind.as_str() {
        "revolute" => JointKind::Revolute,
        "continuous" => JointKind::Continuous,
        "prismatic" => JointKind::Prismatic,
        "fixed" => JointKind::Fixed,
        // floating/planar joints are not driven by joint values
        _ => JointKind::Other,
    };
    Ok(Some(JointDescription {
        name,
        kind,
        limit: None,
        mimic: None,
    }))
}

fn parse_limit(e: &BytesStart) -> Option<JointLimit> {
    let lower = parse_float_attr(e, "lower").unwrap_or(0.0);
    let upper = parse_float_attr(e, "upper").unwrap_or(0.0);
    Some(JointLimit { lower, upper })
}

fn xml_error(source: &Url, reader: &Reader<&[u8]>, error: quick_xml::Error) -> ParseError {
    ParseError::Xml {
        url: source.clone(),
        message: format!("{error} (at byte {})", reader.buffer_position()),
    }
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn get_attribute(e: &BytesStart, name: &'static str) -> Result<String, ParseError> {
    get_attribute_opt(e, name).ok_or_else(|| ParseError::MissingAttribute {
        attribute: name,
        element: element_name(e),
    })
}

fn get_attribute_opt(e: &BytesStart, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return String::from_utf8(attr.value.to_vec()).ok();
        }
    }
    None
}

fn parse_float_attr(e: &BytesStart, name: &str) -> Option<f64> {
    get_attribute_opt(e, name).and_then(|s| s.trim().parse().ok())
}
