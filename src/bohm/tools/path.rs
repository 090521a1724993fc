//! Typed accessors into an [`Element`].
//!
//! Schedules address element fields with dotted path strings such as
//! `classification.full` or `coreProperties."Specification"."Fire Rating"`.
//! Segments may be wrapped in double quotes so that they can carry dots,
//! spaces or other punctuation; inside quotes `\"` and `\\` are escapes.
//! Paths are parsed once into a [`FieldPath`] and malformed or unknown paths
//! are rejected up front instead of resolving to nothing at sync time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bohm::tools::error::{Result, ToolError};
use crate::bohm::tools::model::{Classification, Element};

/// Component of a `{code, name, full}` classification value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassificationField {
    Code,
    Name,
    Full,
}

/// Component of a library part reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryPartField {
    Index,
    DocumentName,
    UniqueId,
}

/// A validated location inside an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    Guid,
    ProjectCode,
    Name,
    Type,
    Variation,
    ModiStamp,
    Classification(ClassificationField),
    ClassificationGroup(ClassificationField),
    LibraryPart(LibraryPartField),
    CoreProperty { group: String, property: String },
    CustomProperty { group: String, property: String },
}

impl FieldPath {
    pub fn core(group: impl Into<String>, property: impl Into<String>) -> Self {
        Self::CoreProperty {
            group: group.into(),
            property: property.into(),
        }
    }

    pub fn custom(group: impl Into<String>, property: impl Into<String>) -> Self {
        Self::CustomProperty {
            group: group.into(),
            property: property.into(),
        }
    }

    /// Parses a dotted path expression.
    pub fn parse(source: &str) -> Result<Self> {
        let segments = split_segments(source)?;
        let invalid = |reason: &str| ToolError::InvalidPath {
            path: source.to_string(),
            reason: reason.to_string(),
        };
        let refs: Vec<&str> = segments.iter().map(String::as_str).collect();

        let path = match refs.as_slice() {
            ["guid"] => Self::Guid,
            ["projectCode"] => Self::ProjectCode,
            ["name"] => Self::Name,
            ["type"] => Self::Type,
            ["variation"] => Self::Variation,
            ["modiStamp"] => Self::ModiStamp,
            ["classification", field] => Self::Classification(
                parse_classification_field(field)
                    .ok_or_else(|| invalid("unknown classification field"))?,
            ),
            ["classificationGroup", field] => Self::ClassificationGroup(
                parse_classification_field(field)
                    .ok_or_else(|| invalid("unknown classification field"))?,
            ),
            ["libraryPart", field] => Self::LibraryPart(match *field {
                "index" => LibraryPartField::Index,
                "documentName" => LibraryPartField::DocumentName,
                "uniqueId" => LibraryPartField::UniqueId,
                _ => return Err(invalid("unknown library part field")),
            }),
            ["coreProperties", group, property] => Self::core(*group, *property),
            ["customProperties", group, property] => Self::custom(*group, *property),
            ["coreProperties" | "customProperties", ..] => {
                return Err(invalid("property paths need exactly a group and a property"));
            }
            _ => return Err(invalid("unknown element field")),
        };
        Ok(path)
    }

    /// Reads the value at this path. Absent groups and properties read as `None`.
    pub fn get<'a>(&self, element: &'a Element) -> Option<&'a str> {
        match self {
            Self::Guid => Some(element.guid.as_str()),
            Self::ProjectCode => element.project_code.as_deref(),
            Self::Name => element.name.as_deref(),
            Self::Type => element.element_type.as_deref(),
            Self::Variation => element.variation.as_deref(),
            Self::ModiStamp => element.modi_stamp.as_deref(),
            Self::Classification(field) => classification_get(&element.classification, *field),
            Self::ClassificationGroup(field) => {
                classification_get(&element.classification_group, *field)
            }
            Self::LibraryPart(field) => {
                let part = &element.library_part;
                match field {
                    LibraryPartField::Index => part.index.as_deref(),
                    LibraryPartField::DocumentName => part.document_name.as_deref(),
                    LibraryPartField::UniqueId => part.unique_id.as_deref(),
                }
            }
            Self::CoreProperty { group, property } => element
                .core_properties
                .get(group)
                .and_then(|values| values.get(property))
                .and_then(|value| value.as_deref()),
            Self::CustomProperty { group, property } => element
                .custom_properties
                .get(group)
                .and_then(|values| values.get(property))
                .and_then(|value| value.as_deref()),
        }
    }

    /// Writes a value at this path, creating the property group if needed.
    ///
    /// Writing any classification component recomputes `full`; writing `full`
    /// splits it back into code and name.
    pub fn set(&self, element: &mut Element, value: Option<String>) {
        match self {
            Self::Guid => element.guid = value.unwrap_or_default(),
            Self::ProjectCode => element.project_code = value,
            Self::Name => element.name = value,
            Self::Type => element.element_type = value,
            Self::Variation => element.variation = value,
            Self::ModiStamp => element.modi_stamp = value,
            Self::Classification(field) => {
                classification_set(&mut element.classification, *field, value)
            }
            Self::ClassificationGroup(field) => {
                classification_set(&mut element.classification_group, *field, value)
            }
            Self::LibraryPart(field) => {
                let part = &mut element.library_part;
                match field {
                    LibraryPartField::Index => part.index = value,
                    LibraryPartField::DocumentName => part.document_name = value,
                    LibraryPartField::UniqueId => part.unique_id = value,
                }
            }
            Self::CoreProperty { group, property } => {
                element
                    .core_properties
                    .entry(group.clone())
                    .or_default()
                    .insert(property.clone(), value);
            }
            Self::CustomProperty { group, property } => {
                element
                    .custom_properties
                    .entry(group.clone())
                    .or_default()
                    .insert(property.clone(), value);
            }
        }
    }
}

fn parse_classification_field(field: &str) -> Option<ClassificationField> {
    match field {
        "code" => Some(ClassificationField::Code),
        "name" => Some(ClassificationField::Name),
        "full" => Some(ClassificationField::Full),
        _ => None,
    }
}

fn classification_get(classification: &Classification, field: ClassificationField) -> Option<&str> {
    match field {
        ClassificationField::Code => classification.code.as_deref(),
        ClassificationField::Name => classification.name.as_deref(),
        ClassificationField::Full => classification.full.as_deref(),
    }
}

fn classification_set(
    classification: &mut Classification,
    field: ClassificationField,
    value: Option<String>,
) {
    match field {
        ClassificationField::Code => {
            classification.code = value;
            classification.refresh_full();
        }
        ClassificationField::Name => {
            classification.name = value;
            classification.refresh_full();
        }
        ClassificationField::Full => {
            *classification = value
                .as_deref()
                .map(Classification::from_full)
                .unwrap_or_default();
        }
    }
}

fn split_segments(source: &str) -> Result<Vec<String>> {
    let invalid = |reason: &str| ToolError::InvalidPath {
        path: source.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut was_quoted = false;
    let mut chars = source.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if quoted => match chars.next() {
                Some(escaped @ ('"' | '\\')) => current.push(escaped),
                _ => return Err(invalid("unsupported escape sequence")),
            },
            '"' if quoted => {
                quoted = false;
            }
            '"' if current.is_empty() && !was_quoted => {
                quoted = true;
                was_quoted = true;
            }
            '"' => return Err(invalid("quote inside an unquoted segment")),
            '.' if !quoted => {
                if current.is_empty() && !was_quoted {
                    return Err(invalid("empty segment"));
                }
                segments.push(std::mem::take(&mut current));
                was_quoted = false;
            }
            _ if was_quoted && !quoted => {
                return Err(invalid("characters after a closing quote"));
            }
            other => current.push(other),
        }
    }

    if quoted {
        return Err(invalid("unterminated quote"));
    }
    if current.is_empty() && !was_quoted {
        return Err(invalid("empty segment"));
    }
    segments.push(current);
    Ok(segments)
}

fn write_segment(f: &mut fmt::Formatter<'_>, segment: &str) -> fmt::Result {
    let plain = !segment.is_empty()
        && segment
            .chars()
            .all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '-');
    if plain {
        return f.write_str(segment);
    }
    f.write_str("\"")?;
    for ch in segment.chars() {
        if ch == '"' || ch == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{ch}")?;
    }
    f.write_str("\"")
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let classification = |field: &ClassificationField| match field {
            ClassificationField::Code => "code",
            ClassificationField::Name => "name",
            ClassificationField::Full => "full",
        };
        match self {
            Self::Guid => f.write_str("guid"),
            Self::ProjectCode => f.write_str("projectCode"),
            Self::Name => f.write_str("name"),
            Self::Type => f.write_str("type"),
            Self::Variation => f.write_str("variation"),
            Self::ModiStamp => f.write_str("modiStamp"),
            Self::Classification(field) => write!(f, "classification.{}", classification(field)),
            Self::ClassificationGroup(field) => {
                write!(f, "classificationGroup.{}", classification(field))
            }
            Self::LibraryPart(field) => {
                let name = match field {
                    LibraryPartField::Index => "index",
                    LibraryPartField::DocumentName => "documentName",
                    LibraryPartField::UniqueId => "uniqueId",
                };
                write!(f, "libraryPart.{name}")
            }
            Self::CoreProperty { group, property } => {
                f.write_str("coreProperties.")?;
                write_segment(f, group)?;
                f.write_str(".")?;
                write_segment(f, property)
            }
            Self::CustomProperty { group, property } => {
                f.write_str("customProperties.")?;
                write_segment(f, group)?;
                f.write_str(".")?;
                write_segment(f, property)
            }
        }
    }
}

impl FromStr for FieldPath {
    type Err = ToolError;

    fn from_str(source: &str) -> Result<Self> {
        Self::parse(source)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::parse(&source).map_err(serde::de::Error::custom)
    }
}
