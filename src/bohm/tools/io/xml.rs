//! Authoring-tool project file codec.
//!
//! ```xml
//! <project name="Tower A">
//!   <elements>
//!     <element guid="G1" name="Door-01" type="Door" variation="Single" modiStamp="42">
//!       <classification code="Pr_20" name="Doors"/>
//!       <classification-group code="Pr" name="Products"/>
//!       <library-part index="3" documentName="Door 18" uniqueId="{...}"/>
//!       <core-property-groups>
//!         <group name="Specification"><property name="Manufacturer" value="Acme"/></group>
//!       </core-property-groups>
//!       <custom-property-groups>...</custom-property-groups>
//!     </element>
//!   </elements>
//!   <deleted-elements><element guid="G7"/></deleted-elements>
//! </project>
//! ```
//!
//! Property lookups compare the decoded `name` attributes directly, so group
//! and property names containing quotes or other markup need no escaping on
//! the read side; the writer escapes attribute values.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use tracing::{debug, info, instrument, warn};

use crate::bohm::tools::error::{Result, ToolError};
use crate::bohm::tools::io::atomic_write;
use crate::bohm::tools::model::{Classification, Element, LibraryPart, PropertyValues, non_empty};
use crate::bohm::tools::schema::{PropertyGroup, Schema};

/// Decoded attributes of one XML element, in document order.
pub type Attributes = IndexMap<String, String>;

/// Structural event produced by [`walk`].
pub enum XmlNode<'a> {
    Open {
        name: &'a str,
        parents: &'a [String],
        attributes: Attributes,
    },
    Close {
        name: &'a str,
        parents: &'a [String],
    },
}

/// Streams the element structure of `source` to `visit`. Self-closing
/// elements produce an `Open` immediately followed by a `Close`.
pub fn walk<F>(source: &str, mut visit: F) -> Result<()>
where
    F: FnMut(XmlNode<'_>) -> Result<()>,
{
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let name = local_name(e)?;
                let attributes = read_attributes(e)?;
                visit(XmlNode::Open {
                    name: &name,
                    parents: &stack,
                    attributes,
                })?;
                stack.push(name);
            }
            Event::Empty(ref e) => {
                let name = local_name(e)?;
                let attributes = read_attributes(e)?;
                visit(XmlNode::Open {
                    name: &name,
                    parents: &stack,
                    attributes,
                })?;
                visit(XmlNode::Close {
                    name: &name,
                    parents: &stack,
                })?;
            }
            Event::End(_) => {
                if let Some(name) = stack.pop() {
                    visit(XmlNode::Close {
                        name: &name,
                        parents: &stack,
                    })?;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn local_name(e: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(e.local_name().as_ref())
        .map(str::to_string)
        .map_err(|err| ToolError::DataShape(format!("element name is not UTF-8: {err}")))
}

fn read_attributes(e: &BytesStart<'_>) -> Result<Attributes> {
    let mut attributes = Attributes::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(|err| ToolError::DataShape(format!("attribute name is not UTF-8: {err}")))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| ToolError::DataShape(format!("attribute '{key}': {err}")))?
            .into_owned();
        attributes.insert(key, value);
    }
    Ok(attributes)
}

/// Contents of one project file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDocument {
    pub name: String,
    pub elements: Vec<Element>,
    pub deleted_elements: Vec<String>,
    /// Optional element-type-group hint per GUID, used to refine classifications.
    pub element_type_groups: IndexMap<String, String>,
}

impl ProjectDocument {
    pub fn new(name: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            name: name.into(),
            elements,
            ..Self::default()
        }
    }
}

type RawGroups = IndexMap<String, IndexMap<String, Option<String>>>;

#[derive(Default)]
struct RawElement {
    attributes: Attributes,
    classification: Option<Attributes>,
    classification_group: Option<Attributes>,
    library_part: Option<Attributes>,
    core: RawGroups,
    custom: RawGroups,
    open_group: Option<(bool, String)>,
}

#[derive(Default)]
struct ProjectParser {
    name: Option<String>,
    raw: Vec<RawElement>,
    current: Option<RawElement>,
    deleted: Vec<String>,
}

impl ProjectParser {
    fn visit(&mut self, node: XmlNode<'_>) -> Result<()> {
        match node {
            XmlNode::Open {
                name,
                parents,
                attributes,
            } => {
                let parent = parents.last().map(String::as_str);
                match (parent, name) {
                    (None, "project") => {
                        self.name = attributes.get("name").cloned();
                    }
                    (Some("elements"), "element") => {
                        self.current = Some(RawElement {
                            attributes,
                            ..RawElement::default()
                        });
                    }
                    (Some("deleted-elements"), "element") => {
                        match attributes.get("guid").and_then(|guid| non_empty(guid)) {
                            Some(guid) => self.deleted.push(guid),
                            None => warn!("deleted element without a guid skipped"),
                        }
                    }
                    (Some("element"), child) => {
                        if let Some(raw) = self.current.as_mut() {
                            match child {
                                "classification" => raw.classification = Some(attributes),
                                "classification-group" => {
                                    raw.classification_group = Some(attributes)
                                }
                                "library-part" => raw.library_part = Some(attributes),
                                _ => {}
                            }
                        }
                    }
                    (
                        Some(family @ ("core-property-groups" | "custom-property-groups")),
                        "group",
                    ) => {
                        if let (Some(raw), Some(group)) =
                            (self.current.as_mut(), attributes.get("name"))
                        {
                            let core = family == "core-property-groups";
                            raw.open_group = Some((core, group.clone()));
                        }
                    }
                    (Some("group"), "property") => {
                        if let Some(raw) = self.current.as_mut() {
                            if let (Some((core, group)), Some(property)) =
                                (raw.open_group.as_ref(), attributes.get("name"))
                            {
                                let value = attributes.get("value").and_then(|v| non_empty(v));
                                let groups = if *core { &mut raw.core } else { &mut raw.custom };
                                groups
                                    .entry(group.clone())
                                    .or_default()
                                    .insert(property.clone(), value);
                            }
                        }
                    }
                    _ => {}
                }
            }
            XmlNode::Close { name, parents } => {
                let parent = parents.last().map(String::as_str);
                match (parent, name) {
                    (Some("elements"), "element") => {
                        if let Some(raw) = self.current.take() {
                            self.raw.push(raw);
                        }
                    }
                    (Some("core-property-groups" | "custom-property-groups"), "group") => {
                        if let Some(raw) = self.current.as_mut() {
                            raw.open_group = None;
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

/// Parses a project file into schema-complete elements.
///
/// Elements without a guid or classification are skipped with a warning;
/// a project without a name is rejected.
pub fn parse_project(source: &str, schema: &Schema) -> Result<ProjectDocument> {
    let mut parser = ProjectParser::default();
    walk(source, |node| parser.visit(node))?;

    let name = parser
        .name
        .as_deref()
        .and_then(non_empty)
        .ok_or_else(|| ToolError::DataShape("project element has no name".into()))?;

    let mut document = ProjectDocument {
        name,
        deleted_elements: parser.deleted,
        ..ProjectDocument::default()
    };

    for (position, raw) in parser.raw.into_iter().enumerate() {
        let hint = raw
            .attributes
            .get("element-type-group")
            .and_then(|value| non_empty(value));
        match build_element(raw, schema) {
            Ok(element) => {
                if let Some(hint) = hint {
                    document
                        .element_type_groups
                        .insert(element.guid.clone(), hint);
                }
                document.elements.push(element);
            }
            Err(error) if error.is_skippable() => {
                warn!(position, %error, "skipping element");
            }
            Err(error) => return Err(error),
        }
    }

    debug!(
        element_count = document.elements.len(),
        deleted_count = document.deleted_elements.len(),
        "parsed project document"
    );
    Ok(document)
}

fn build_element(raw: RawElement, schema: &Schema) -> Result<Element> {
    let attribute = |key: &str| raw.attributes.get(key).and_then(|value| non_empty(value));
    let guid = attribute("guid")
        .ok_or_else(|| ToolError::DataShape("element has no guid".into()))?;
    let classification = raw
        .classification
        .as_ref()
        .map(classification_from)
        .ok_or_else(|| ToolError::DataShape(format!("element {guid} has no classification")))?;

    let mut element = Element::new(guid);
    element.name = attribute("name");
    element.element_type = attribute("type");
    element.variation = attribute("variation");
    element.modi_stamp = attribute("modiStamp");
    element.classification = classification;
    element.classification_group = raw
        .classification_group
        .as_ref()
        .map(classification_from)
        .unwrap_or_default();
    if let Some(part) = raw.library_part.as_ref() {
        let value = |key: &str| part.get(key).and_then(|value| non_empty(value));
        element.library_part = LibraryPart {
            index: value("index"),
            document_name: value("documentName"),
            unique_id: value("uniqueId"),
        };
    }

    for group in schema.core_groups() {
        element
            .core_properties
            .insert(group.storage_key.clone(), extract_group(group, raw.core.get(&group.name)));
    }
    if let Some(group) = schema.custom_group_for(&element.classification_group) {
        element.custom_properties.insert(
            group.storage_key.clone(),
            extract_group(group, raw.custom.get(&group.name)),
        );
    }

    Ok(element)
}

fn classification_from(attributes: &Attributes) -> Classification {
    Classification::new(
        attributes.get("code").and_then(|value| non_empty(value)),
        attributes.get("name").and_then(|value| non_empty(value)),
    )
}

fn extract_group(
    group: &PropertyGroup,
    raw: Option<&IndexMap<String, Option<String>>>,
) -> PropertyValues {
    group
        .properties
        .iter()
        .map(|property| {
            let value = raw
                .and_then(|values| values.get(&property.name))
                .cloned()
                .flatten();
            (property.storage_key.clone(), value)
        })
        .collect()
}

/// Serialises elements back into a project file. Groups and properties are
/// written in schema order; custom groups unknown to the schema are dropped.
pub fn compose_project(document: &ProjectDocument, schema: &Schema) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(
        BytesStart::new("project").with_attributes([("name", document.name.as_str())]),
    ))?;

    writer.write_event(Event::Start(BytesStart::new("elements")))?;
    for element in &document.elements {
        write_element(
            &mut writer,
            element,
            document.element_type_groups.get(&element.guid),
            schema,
        )?;
    }
    writer.write_event(Event::End(BytesEnd::new("elements")))?;

    writer.write_event(Event::Start(BytesStart::new("deleted-elements")))?;
    for guid in &document.deleted_elements {
        writer.write_event(Event::Empty(
            BytesStart::new("element").with_attributes([("guid", guid.as_str())]),
        ))?;
    }
    writer.write_event(Event::End(BytesEnd::new("deleted-elements")))?;
    writer.write_event(Event::End(BytesEnd::new("project")))?;

    String::from_utf8(writer.into_inner())
        .map_err(|err| ToolError::DataShape(format!("composed XML is not UTF-8: {err}")))
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    element_type_group: Option<&String>,
    schema: &Schema,
) -> Result<()> {
    let mut attributes = vec![("guid", element.guid.as_str())];
    push_optional(&mut attributes, "name", &element.name);
    push_optional(&mut attributes, "type", &element.element_type);
    push_optional(&mut attributes, "variation", &element.variation);
    push_optional(&mut attributes, "modiStamp", &element.modi_stamp);
    if let Some(hint) = element_type_group {
        attributes.push(("element-type-group", hint.as_str()));
    }
    writer.write_event(Event::Start(
        BytesStart::new("element").with_attributes(attributes),
    ))?;

    write_classification(writer, "classification", &element.classification)?;
    write_classification(writer, "classification-group", &element.classification_group)?;

    let mut part = Vec::new();
    push_optional(&mut part, "index", &element.library_part.index);
    push_optional(&mut part, "documentName", &element.library_part.document_name);
    push_optional(&mut part, "uniqueId", &element.library_part.unique_id);
    writer.write_event(Event::Empty(
        BytesStart::new("library-part").with_attributes(part),
    ))?;

    writer.write_event(Event::Start(BytesStart::new("core-property-groups")))?;
    for group in schema.core_groups() {
        write_group(writer, group, element.core_properties.get(&group.storage_key))?;
    }
    writer.write_event(Event::End(BytesEnd::new("core-property-groups")))?;

    writer.write_event(Event::Start(BytesStart::new("custom-property-groups")))?;
    for (key, values) in &element.custom_properties {
        match schema.custom_group_by_key(key) {
            Some(group) => write_group(writer, group, Some(values))?,
            None => {
                debug!(guid = %element.guid, group = %key, "custom group not in schema; skipped")
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new("custom-property-groups")))?;

    writer.write_event(Event::End(BytesEnd::new("element")))?;
    Ok(())
}

fn push_optional<'a>(
    attributes: &mut Vec<(&'static str, &'a str)>,
    key: &'static str,
    value: &'a Option<String>,
) {
    if let Some(value) = value {
        attributes.push((key, value.as_str()));
    }
}

fn write_classification(
    writer: &mut Writer<Vec<u8>>,
    tag: &str,
    classification: &Classification,
) -> Result<()> {
    let mut attributes = Vec::new();
    push_optional(&mut attributes, "code", &classification.code);
    push_optional(&mut attributes, "name", &classification.name);
    push_optional(&mut attributes, "full", &classification.full);
    writer.write_event(Event::Empty(BytesStart::new(tag).with_attributes(attributes)))?;
    Ok(())
}

fn write_group(
    writer: &mut Writer<Vec<u8>>,
    group: &PropertyGroup,
    values: Option<&PropertyValues>,
) -> Result<()> {
    writer.write_event(Event::Start(
        BytesStart::new("group").with_attributes([("name", group.name.as_str())]),
    ))?;
    for property in &group.properties {
        let value = values
            .and_then(|values| values.get(&property.storage_key))
            .and_then(|value| value.as_deref());
        let mut attributes = vec![("name", property.name.as_str())];
        if let Some(value) = value {
            attributes.push(("value", value));
        }
        writer.write_event(Event::Empty(
            BytesStart::new("property").with_attributes(attributes),
        ))?;
    }
    writer.write_event(Event::End(BytesEnd::new("group")))?;
    Ok(())
}

/// Reads and parses a project file from disk.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_project_file(path: &Path, schema: &Schema) -> Result<ProjectDocument> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let source = fs::read_to_string(path)?;
    let document = parse_project(&source, schema)?;
    info!(element_count = document.elements.len(), "read project file");
    Ok(document)
}

/// Composes and writes a project file to disk.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn write_project_file(path: &Path, document: &ProjectDocument, schema: &Schema) -> Result<()> {
    let xml = compose_project(document, schema)?;
    atomic_write(path, xml.as_bytes())?;
    info!(element_count = document.elements.len(), "wrote project file");
    Ok(())
}
