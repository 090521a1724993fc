//! Property group schema.
//!
//! The schema is read once per run from the add-on configuration XML:
//!
//! ```xml
//! <configuration>
//!   <property-groups>
//!     <core name="Specification" database-name="specification">
//!       <property name="Manufacturer" database-name="manufacturer" editable="true"/>
//!     </core>
//!     <custom name="Pr Products">
//!       <property name="Fire Rating" column="Fire rating (min)"/>
//!     </custom>
//!   </property-groups>
//!   <classification-options><classification code="Pr_20" name="Doors"/></classification-options>
//!   <classification-group-options>
//!     <classification code="Pr" name="Products"/>
//!   </classification-group-options>
//!   <classification-group-custom-property-group-mapping>
//!     <mapping classification-group="Pr" property-group="Pr Products"/>
//!   </classification-group-custom-property-group-mapping>
//! </configuration>
//! ```
//!
//! Declaration order is preserved everywhere because it drives column order
//! in generated spreadsheets and element order in composed XML.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::bohm::tools::error::{Result, ToolError};
use crate::bohm::tools::io::xml::{XmlNode, walk};
use crate::bohm::tools::model::{Classification, compose_full};

/// One property of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    /// Name used in the project file.
    pub name: String,
    /// Key used in store records and element property maps.
    pub storage_key: String,
    /// Spreadsheet header.
    pub column_name: String,
    /// Whether collaborators may edit the value in a spreadsheet.
    pub editable: bool,
}

/// Named, ordered set of properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyGroup {
    pub name: String,
    pub storage_key: String,
    pub properties: Vec<PropertyDefinition>,
}

impl PropertyGroup {
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|property| property.name == name)
    }
}

/// Which family a property group belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupFamily {
    /// Applies to every element.
    Core,
    /// Applies to elements whose classification group maps to it.
    Custom,
}

/// Loaded, validated configuration model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    core: IndexMap<String, PropertyGroup>,
    custom: IndexMap<String, PropertyGroup>,
    classification_options: IndexMap<String, String>,
    classification_group_options: IndexMap<String, String>,
    group_mapping: IndexMap<String, String>,
}

impl Schema {
    /// Reads and validates a schema file.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        let schema = Self::from_xml_str(&source)?;
        debug!(
            core_groups = schema.core.len(),
            custom_groups = schema.custom.len(),
            mappings = schema.group_mapping.len(),
            "schema loaded"
        );
        Ok(schema)
    }

    pub fn from_xml_str(source: &str) -> Result<Self> {
        let mut builder = SchemaBuilder::default();
        walk(source, |node| builder.visit(node))?;
        builder.finish()
    }

    pub fn core_groups(&self) -> impl Iterator<Item = &PropertyGroup> {
        self.core.values()
    }

    pub fn custom_groups(&self) -> impl Iterator<Item = &PropertyGroup> {
        self.custom.values()
    }

    pub fn core_group(&self, name: &str) -> Option<&PropertyGroup> {
        self.core.get(name)
    }

    pub fn custom_group(&self, name: &str) -> Option<&PropertyGroup> {
        self.custom.get(name)
    }

    /// Finds a custom group by the key it is stored under on elements.
    pub fn custom_group_by_key(&self, storage_key: &str) -> Option<&PropertyGroup> {
        self.custom
            .values()
            .find(|group| group.storage_key == storage_key)
    }

    /// Selects the custom group that applies to a classification group.
    ///
    /// The mapping is consulted by code and then by full name. Without a
    /// mapping entry, a custom group named after the full name applies.
    pub fn custom_group_for(
        &self,
        classification_group: &Classification,
    ) -> Option<&PropertyGroup> {
        let mapped = [
            classification_group.code.as_deref(),
            classification_group.full.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find_map(|key| self.group_mapping.get(key))
        .and_then(|group| self.custom.get(group));

        mapped.or_else(|| {
            classification_group
                .full
                .as_deref()
                .and_then(|full| self.custom.get(full))
        })
    }

    /// Classification code → name, in declaration order.
    pub fn classification_options(&self) -> &IndexMap<String, String> {
        &self.classification_options
    }

    /// Classification group code → name, in declaration order.
    pub fn classification_group_options(&self) -> &IndexMap<String, String> {
        &self.classification_group_options
    }

    /// `"{code} {name}"` labels offered in classification dropdowns.
    pub fn classification_labels(&self) -> Vec<String> {
        option_labels(&self.classification_options)
    }

    pub fn classification_group_labels(&self) -> Vec<String> {
        option_labels(&self.classification_group_options)
    }
}

fn option_labels(options: &IndexMap<String, String>) -> Vec<String> {
    options
        .iter()
        .filter_map(|(code, name)| compose_full(Some(code), Some(name)))
        .collect()
}

#[derive(Default)]
struct SchemaBuilder {
    schema: Schema,
    current: Option<(GroupFamily, PropertyGroup)>,
}

impl SchemaBuilder {
    fn visit(&mut self, node: XmlNode<'_>) -> Result<()> {
        match node {
            XmlNode::Open {
                name,
                parents,
                attributes,
            } => {
                let parent = parents.last().map(String::as_str);
                match (parent, name) {
                    (Some("property-groups"), "core" | "custom") => {
                        let family = if name == "core" {
                            GroupFamily::Core
                        } else {
                            GroupFamily::Custom
                        };
                        let group_name = required(&attributes, "name", name)?;
                        let storage_key = attributes
                            .get("database-name")
                            .cloned()
                            .unwrap_or_else(|| group_name.clone());
                        self.current = Some((
                            family,
                            PropertyGroup {
                                name: group_name,
                                storage_key,
                                properties: Vec::new(),
                            },
                        ));
                    }
                    (Some("core" | "custom"), "property") => {
                        let Some((_, group)) = self.current.as_mut() else {
                            return Err(ToolError::Configuration(
                                "property declared outside a property group".into(),
                            ));
                        };
                        let property_name = required(&attributes, "name", "property")?;
                        if group.property(&property_name).is_some() {
                            return Err(ToolError::Configuration(format!(
                                "duplicate property '{property_name}' in group '{}'",
                                group.name
                            )));
                        }
                        let storage_key = attributes
                            .get("database-name")
                            .cloned()
                            .unwrap_or_else(|| property_name.clone());
                        if group
                            .properties
                            .iter()
                            .any(|property| property.storage_key == storage_key)
                        {
                            return Err(ToolError::Configuration(format!(
                                "duplicate storage key '{storage_key}' in group '{}'",
                                group.name
                            )));
                        }
                        let column_name = attributes
                            .get("column")
                            .cloned()
                            .unwrap_or_else(|| property_name.clone());
                        let editable = match attributes.get("editable").map(String::as_str) {
                            None | Some("true") => true,
                            Some("false") => false,
                            Some(other) => {
                                return Err(ToolError::Configuration(format!(
                                    "invalid editable flag '{other}' on property '{property_name}'"
                                )));
                            }
                        };
                        group.properties.push(PropertyDefinition {
                            name: property_name,
                            storage_key,
                            column_name,
                            editable,
                        });
                    }
                    (Some("classification-options"), "classification") => {
                        let (code, label) = option(&attributes)?;
                        self.schema.classification_options.insert(code, label);
                    }
                    (Some("classification-group-options"), "classification") => {
                        let (code, label) = option(&attributes)?;
                        self.schema.classification_group_options.insert(code, label);
                    }
                    (Some("classification-group-custom-property-group-mapping"), "mapping") => {
                        let group = required(&attributes, "classification-group", "mapping")?;
                        let target = required(&attributes, "property-group", "mapping")?;
                        if self.schema.group_mapping.insert(group.clone(), target).is_some() {
                            return Err(ToolError::Configuration(format!(
                                "classification group '{group}' is mapped more than once"
                            )));
                        }
                    }
                    _ => {}
                }
                Ok(())
            }
            XmlNode::Close { name, parents } => {
                let parent = parents.last().map(String::as_str);
                if parent == Some("property-groups") && matches!(name, "core" | "custom") {
                    if let Some((family, group)) = self.current.take() {
                        self.add_group(family, group)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn add_group(&mut self, family: GroupFamily, group: PropertyGroup) -> Result<()> {
        let groups = match family {
            GroupFamily::Core => &mut self.schema.core,
            GroupFamily::Custom => &mut self.schema.custom,
        };
        if groups.contains_key(&group.name) {
            return Err(ToolError::Configuration(format!(
                "duplicate {} property group '{}'",
                family.label(),
                group.name
            )));
        }
        if groups
            .values()
            .any(|existing| existing.storage_key == group.storage_key)
        {
            return Err(ToolError::Configuration(format!(
                "duplicate {} storage key '{}'",
                family.label(),
                group.storage_key
            )));
        }
        groups.insert(group.name.clone(), group);
        Ok(())
    }

    fn finish(self) -> Result<Schema> {
        let schema = self.schema;
        for (classification_group, target) in &schema.group_mapping {
            if !schema.custom.contains_key(target) {
                return Err(ToolError::Configuration(format!(
                    "classification group '{classification_group}' maps to \
                     undeclared custom group '{target}'"
                )));
            }
        }
        Ok(schema)
    }
}

impl GroupFamily {
    fn label(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Custom => "custom",
        }
    }
}

fn required(attributes: &IndexMap<String, String>, key: &str, element: &str) -> Result<String> {
    attributes
        .get(key)
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or_else(|| {
            ToolError::Configuration(format!("<{element}> is missing the '{key}' attribute"))
        })
}

fn option(attributes: &IndexMap<String, String>) -> Result<(String, String)> {
    let code = required(attributes, "code", "classification")?;
    let name = attributes.get("name").cloned().unwrap_or_default();
    Ok((code, name))
}
