//! Projection of store elements onto a schedule's spreadsheet.
//!
//! A schedule without a spreadsheet gets one created and fully written. A
//! bound schedule is patched in place: stale rows go, missing rows are
//! appended, and present rows are rewritten only where the store moved on
//! since the last completed export.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::bohm::tools::error::Result;
use crate::bohm::tools::io::document::conform;
use crate::bohm::tools::io::sheet::{
    FIRST_DATA_ROW, GeneralReferences, compose_row, field_offset, guid_column, sheet_applies,
    write_sheet,
};
use crate::bohm::tools::layout::{
    deletion_requests, delete_rows_descending, initial_values, layout_requests, sheet_names,
    spreadsheet_title,
};
use crate::bohm::tools::model::{Element, Schedule, ScheduleSheet, SheetType, non_empty};
use crate::bohm::tools::path::FieldPath;
use crate::bohm::tools::reconcile::diff::values_equal;
use crate::bohm::tools::schema::Schema;
use crate::bohm::tools::settings::SyncSettings;
use crate::bohm::tools::sheets::{FormatRequest, Row, SpreadsheetService, ValueRange};

/// What one schedule export did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub schedule: String,
    pub created: bool,
    pub rows_deleted: usize,
    pub rows_appended: usize,
    pub rows_rewritten: usize,
    pub cells_written: usize,
}

impl ScheduleReport {
    pub fn new(schedule: &str) -> Self {
        Self {
            schedule: schedule.to_string(),
            ..Self::default()
        }
    }

    /// Whether the export changed anything in the spreadsheet.
    pub fn wrote(&self) -> bool {
        self.created
            || self.rows_deleted > 0
            || self.rows_appended > 0
            || self.rows_rewritten > 0
            || self.cells_written > 0
    }
}

/// Sleeps between consecutive write batches.
struct Pacer {
    cooldown: Duration,
    wrote: bool,
}

impl Pacer {
    fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            wrote: false,
        }
    }

    fn pace(&mut self) {
        if self.wrote && !self.cooldown.is_zero() {
            debug!(
                cooldown_ms = self.cooldown.as_millis() as u64,
                "cooling down before next write"
            );
            thread::sleep(self.cooldown);
        }
        self.wrote = true;
    }
}

/// Writes elements into the spreadsheets of one project's schedules.
pub struct Exporter<'a, P: SpreadsheetService + ?Sized> {
    spreadsheets: &'a mut P,
    schema: &'a Schema,
    settings: &'a SyncSettings,
    pacer: Pacer,
}

impl<'a, P: SpreadsheetService + ?Sized> Exporter<'a, P> {
    pub fn new(spreadsheets: &'a mut P, schema: &'a Schema, settings: &'a SyncSettings) -> Self {
        Self {
            spreadsheets,
            schema,
            settings,
            pacer: Pacer::new(settings.cooldown()),
        }
    }

    /// Creates and lays out the spreadsheet of an unbound schedule, binding
    /// the schedule to it.
    #[instrument(level = "info", skip_all, fields(schedule = %schedule.name))]
    pub fn create_spreadsheet(
        &mut self,
        project_name: &str,
        schedule: &mut Schedule,
    ) -> Result<()> {
        let title = spreadsheet_title(project_name, &schedule.name, &Utc::now());
        let metadata = self
            .spreadsheets
            .create_spreadsheet(&title, &sheet_names(schedule))?;
        info!(spreadsheet = %metadata.id, url = %metadata.url, "created spreadsheet");

        schedule.external_id = Some(metadata.id.clone());
        schedule.external_name = Some(metadata.name.clone());
        schedule.external_url = Some(metadata.url.clone());

        self.pacer.pace();
        self.spreadsheets.batch_write_values(
            &metadata.id,
            &initial_values(schedule, self.schema, project_name),
        )?;
        self.spreadsheets.batch_apply_formatting(
            &metadata.id,
            &layout_requests(schedule, &metadata, self.schema),
        )?;
        Ok(())
    }

    /// Rewrites every data row of a bound schedule from `elements`.
    #[instrument(level = "info", skip_all, fields(schedule = %schedule.name))]
    pub fn write_full(
        &mut self,
        schedule: &Schedule,
        elements: &[Element],
        report: &mut ScheduleReport,
    ) -> Result<()> {
        let Some(spreadsheet_id) = schedule.external_id.as_deref() else {
            return Ok(());
        };
        let metadata = self.spreadsheets.spreadsheet_metadata(spreadsheet_id)?;
        let elements: Vec<Element> = elements
            .iter()
            .map(|element| conform(element.clone(), self.schema))
            .collect();

        for sheet in &schedule.sheets {
            let Some(sheet_id) = metadata.sheet_id(&sheet.sheet_name) else {
                continue;
            };
            let existing = self.spreadsheets.read_range(spreadsheet_id, &sheet.sheet_name)?;
            if existing.len() > 1 {
                self.spreadsheets.batch_apply_formatting(
                    spreadsheet_id,
                    &[FormatRequest::DeleteRows {
                        sheet_id,
                        start_index: 1,
                        end_index: existing.len() as u32,
                    }],
                )?;
                report.rows_deleted += existing.len() - 1;
            }

            let rows = write_sheet(&elements, sheet, schedule);
            report.rows_appended += rows.len();
            self.write_rows(spreadsheet_id, &sheet.sheet_name, 1, rows)?;
        }
        info!(rows = report.rows_appended, "wrote schedule rows");
        Ok(())
    }

    /// Brings a bound schedule in line with `elements`, writing only what differs.
    #[instrument(level = "info", skip_all, fields(schedule = %schedule.name))]
    pub fn write_incremental(
        &mut self,
        schedule: &Schedule,
        elements: &[Element],
        report: &mut ScheduleReport,
    ) -> Result<()> {
        let Some(spreadsheet_id) = schedule.external_id.as_deref() else {
            return Ok(());
        };
        let metadata = self.spreadsheets.spreadsheet_metadata(spreadsheet_id)?;
        let elements: Vec<Element> = elements
            .iter()
            .map(|element| conform(element.clone(), self.schema))
            .collect();
        let by_guid: HashMap<&str, &Element> = elements
            .iter()
            .map(|element| (element.guid.as_str(), element))
            .collect();
        let references = GeneralReferences::for_schedule(schedule);

        // General first, so core formulas can point at settled general rows.
        let ordered = schedule
            .sheets_of(SheetType::General)
            .chain(schedule.sheets_of(SheetType::Core))
            .chain(schedule.sheets_of(SheetType::Custom));
        let mut general_rows: Option<HashMap<String, u32>> = None;

        for sheet in ordered {
            let Some(sheet_id) = metadata.sheet_id(&sheet.sheet_name) else {
                continue;
            };
            let mut rows = self.spreadsheets.read_range(spreadsheet_id, &sheet.sheet_name)?;
            let column = guid_column(sheet);

            let stale: Vec<usize> = rows
                .iter()
                .enumerate()
                .skip(1)
                .filter_map(|(index, row)| {
                    let guid = row.get(column).and_then(|cell| non_empty(cell))?;
                    let current = by_guid
                        .get(guid.as_str())
                        .is_some_and(|element| sheet_applies(sheet, element));
                    (!current).then_some(index)
                })
                .collect();
            if !stale.is_empty() {
                self.spreadsheets
                    .batch_apply_formatting(spreadsheet_id, &deletion_requests(sheet_id, &stale))?;
                delete_rows_descending(&mut rows, &stale);
                report.rows_deleted += stale.len();
            }

            let mut positions: HashMap<String, usize> = HashMap::new();
            for (index, row) in rows.iter().enumerate().skip(1) {
                if let Some(guid) = row.get(column).and_then(|cell| non_empty(cell)) {
                    positions.entry(guid).or_insert(index);
                }
            }
            let mut next_index = rows.len().max(1);
            let mut appended: Vec<(usize, &Element)> = Vec::new();
            for element in elements.iter().filter(|element| sheet_applies(sheet, element)) {
                if !positions.contains_key(&element.guid) {
                    positions.insert(element.guid.clone(), next_index);
                    appended.push((next_index, element));
                    next_index += 1;
                }
            }

            if sheet.sheet_type == SheetType::General {
                general_rows = Some(
                    positions
                        .iter()
                        .map(|(guid, index)| (guid.clone(), *index as u32 + 1))
                        .collect(),
                );
            }
            let general_row = |guid: &str| -> u32 {
                general_rows
                    .as_ref()
                    .and_then(|rows| rows.get(guid).copied())
                    .or_else(|| {
                        elements
                            .iter()
                            .position(|element| element.guid == guid)
                            .map(|index| FIRST_DATA_ROW + index as u32)
                    })
                    .unwrap_or(FIRST_DATA_ROW)
            };

            let mut ranges = Vec::new();
            for (index, row) in rows.iter().enumerate().skip(1) {
                let Some(element) = row
                    .get(column)
                    .and_then(|cell| non_empty(cell))
                    .and_then(|guid| by_guid.get(guid.as_str()).copied())
                else {
                    continue;
                };
                let desired = compose_row(sheet, element, &references, general_row(&element.guid));
                let cells = stale_cells(sheet, row, &desired, |path| {
                    schedule.is_pending(&element.guid, path)
                });
                if !cells.is_empty() {
                    report.rows_rewritten += 1;
                    report.cells_written += cells.len();
                    ranges.extend(cells.into_iter().map(|(column, value)| {
                        ValueRange::new(
                            sheet.sheet_name.as_str(),
                            index as u32,
                            column as u16,
                            vec![vec![value]],
                        )
                    }));
                }
            }
            if !ranges.is_empty() {
                for chunk in ranges.chunks(self.settings.batch_size) {
                    self.pacer.pace();
                    self.spreadsheets.batch_write_values(spreadsheet_id, chunk)?;
                }
            }

            if let Some((start, _)) = appended.first() {
                let start = *start as u32;
                let rows: Vec<Row> = appended
                    .iter()
                    .map(|(_, element)| {
                        compose_row(sheet, element, &references, general_row(&element.guid))
                    })
                    .collect();
                report.rows_appended += rows.len();
                self.write_rows(spreadsheet_id, &sheet.sheet_name, start, rows)?;
            }
        }

        if report.wrote() {
            info!(
                rows_deleted = report.rows_deleted,
                rows_appended = report.rows_appended,
                cells_written = report.cells_written,
                "patched schedule"
            );
        }
        Ok(())
    }

    /// Writes `rows` from zero-based row `start` in `batch_size` chunks.
    fn write_rows(
        &mut self,
        spreadsheet_id: &str,
        sheet_name: &str,
        start: u32,
        rows: Vec<Row>,
    ) -> Result<()> {
        for (chunk_index, chunk) in rows.chunks(self.settings.batch_size).enumerate() {
            let row = start + (chunk_index * self.settings.batch_size) as u32;
            self.pacer.pace();
            self.spreadsheets.batch_write_values(
                spreadsheet_id,
                &[ValueRange::new(sheet_name, row, 0, chunk.to_vec())],
            )?;
            debug!(sheet = sheet_name, row, rows = chunk.len(), "wrote row batch");
        }
        Ok(())
    }
}

/// Cells of an existing row that must be rewritten.
///
/// Prefix and read-only cells follow the store whenever they differ. Editable
/// cells are only overwritten while the field is pending export, so
/// collaborator edits still waiting to be pulled survive.
fn stale_cells(
    sheet: &ScheduleSheet,
    current: &Row,
    desired: &Row,
    pending: impl Fn(&FieldPath) -> bool,
) -> Vec<(usize, String)> {
    let offset = field_offset(sheet.sheet_type);
    let cell = |row: &Row, column: usize| row.get(column).cloned().unwrap_or_default();

    (0..desired.len())
        .filter_map(|column| {
            let wanted = cell(desired, column);
            let present = cell(current, column);
            let differs = if column < offset {
                wanted.trim() != present.trim()
            } else {
                !values_equal(Some(wanted.as_str()), Some(present.as_str()))
            };
            if !differs {
                return None;
            }
            let field = column.checked_sub(offset).and_then(|index| sheet.fields.get(index));
            match field {
                Some(field) if field.editable && !pending(&field.path) => None,
                _ => Some((column, wanted)),
            }
        })
        .collect()
}
