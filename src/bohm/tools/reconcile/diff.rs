use std::collections::HashSet;

use crate::bohm::tools::io::sheet::{SheetElement, sheet_group_key};
use crate::bohm::tools::model::{Element, Schedule, ScheduleSheet, SheetType};
use crate::bohm::tools::path::FieldPath;
use crate::bohm::tools::schema::Schema;

/// One field to overwrite on a stored element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub path: FieldPath,
    pub new_value: Option<String>,
}

/// Compares two field values treating `None`, empty and blank as equal.
pub fn values_equal(left: Option<&str>, right: Option<&str>) -> bool {
    fn normalize(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|value| !value.is_empty())
    }
    normalize(left) == normalize(right)
}

/// Sheets of `schedule` that carry fields for `element`: the general sheet,
/// every core sheet, and the custom sheet of its classification group.
pub fn applicable_sheets<'s>(
    schedule: &'s Schedule,
    element: &Element,
    schema: &Schema,
) -> Vec<&'s ScheduleSheet> {
    let custom_group = schema.custom_group_for(&element.classification_group);
    schedule
        .sheets
        .iter()
        .filter(|sheet| match sheet.sheet_type {
            SheetType::General | SheetType::Core => true,
            SheetType::Custom => custom_group.is_some_and(|group| {
                sheet_group_key(sheet) == Some(group.storage_key.as_str())
                    || sheet.sheet_name == group.name
            }),
        })
        .collect()
}

/// Editable fields whose spreadsheet value differs from the stored one.
///
/// Sheets that had no row for the element are ignored, so an element that
/// has not reached a property sheet yet does not wipe stored values. Fields
/// still awaiting export are ignored as well: the spreadsheet holds an older
/// value, not an edit.
pub fn detect_changes(
    stored: &Element,
    from_sheet: &SheetElement,
    schedule: &Schedule,
    schema: &Schema,
) -> Vec<FieldChange> {
    let mut seen = HashSet::new();
    applicable_sheets(schedule, &from_sheet.element, schema)
        .into_iter()
        .filter(|sheet| !from_sheet.missing_sheets.contains(&sheet.sheet_name))
        .flat_map(|sheet| sheet.fields.iter())
        .filter(|field| field.editable && !schedule.is_pending(&stored.guid, &field.path))
        .filter_map(|field| {
            let sheet_value = field.path.get(&from_sheet.element);
            if values_equal(sheet_value, field.path.get(stored)) || !seen.insert(&field.path) {
                return None;
            }
            Some(FieldChange {
                path: field.path.clone(),
                new_value: sheet_value.map(str::to_string),
            })
        })
        .collect()
}

pub fn apply_changes(element: &mut Element, changes: &[FieldChange]) {
    for change in changes {
        change.path.set(element, change.new_value.clone());
    }
}

/// Editable fields of `schedule` that differ between two versions of an
/// element, in sheet order.
pub fn changed_editable_fields(
    before: &Element,
    after: &Element,
    schedule: &Schedule,
) -> Vec<FieldPath> {
    let mut changed: Vec<FieldPath> = Vec::new();
    for sheet in &schedule.sheets {
        for field in sheet.fields.iter().filter(|field| field.editable) {
            if !values_equal(field.path.get(before), field.path.get(after))
                && !changed.contains(&field.path)
            {
                changed.push(field.path.clone());
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bohm::tools::model::ScheduleField;

    #[test]
    fn empty_representations_are_equal() {
        assert!(values_equal(None, Some("")));
        assert!(values_equal(Some("  "), None));
        assert!(values_equal(Some("Acme "), Some("Acme")));
        assert!(!values_equal(Some("Acme"), None));
    }

    #[test]
    fn only_editable_differences_are_reported() {
        let schedule = Schedule {
            name: "Doors".into(),
            sheets: vec![ScheduleSheet {
                sheet_type: SheetType::General,
                sheet_name: "General".into(),
                fields: vec![
                    ScheduleField::new(FieldPath::Name, "Name", true),
                    ScheduleField::new(FieldPath::ModiStamp, "MOD", false),
                ],
            }],
            ..Schedule::default()
        };
        let mut before = Element::new("G1");
        before.name = Some("Door-01".into());
        before.modi_stamp = Some("1".into());
        let mut after = before.clone();
        after.name = Some("Door-01A".into());
        after.modi_stamp = Some("2".into());

        assert_eq!(changed_editable_fields(&before, &after, &schedule), [FieldPath::Name]);
        assert!(changed_editable_fields(&before, &before, &schedule).is_empty());
    }
}
