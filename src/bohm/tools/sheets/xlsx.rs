//! `.xlsx` directory backend.
//!
//! Each spreadsheet is stored as `<id>.xlsx` next to a `<id>.layout.json`
//! sidecar holding its metadata and the layout requests applied to it. Cell
//! values live in the workbook only. Dropdown validation is kept in the
//! sidecar; the other layout requests are rendered into the workbook on
//! every save.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use calamine::{DataType, Range, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet};
use tracing::debug;

use crate::bohm::tools::error::{Result, ToolError};
use crate::bohm::tools::io::atomic_write;
use crate::bohm::tools::sheets::memory::{SheetState, WorkbookState};
use crate::bohm::tools::sheets::{
    FormatRequest, Row, SpreadsheetMetadata, SpreadsheetService, ValueRange,
};

const SERVICE: &str = "spreadsheet";

/// Spreadsheets persisted as Excel workbooks under `root`.
#[derive(Debug, Clone)]
pub struct XlsxSpreadsheets {
    root: PathBuf,
}

impl XlsxSpreadsheets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn workbook_path(&self, spreadsheet_id: &str) -> PathBuf {
        self.root.join(format!("{spreadsheet_id}.xlsx"))
    }

    fn layout_path(&self, spreadsheet_id: &str) -> PathBuf {
        self.root.join(format!("{spreadsheet_id}.layout.json"))
    }

    fn load(&self, spreadsheet_id: &str, operation: &'static str) -> Result<WorkbookState> {
        let layout_path = self.layout_path(spreadsheet_id);
        if !layout_path.exists() {
            return Err(ToolError::not_found("spreadsheet", spreadsheet_id));
        }
        let layout = fs::read_to_string(&layout_path)
            .map_err(|err| ToolError::external(SERVICE, operation, spreadsheet_id, err))?;
        let mut state: WorkbookState = serde_json::from_str(&layout)
            .map_err(|err| ToolError::external(SERVICE, operation, spreadsheet_id, err))?;

        let workbook_path = self.workbook_path(spreadsheet_id);
        if workbook_path.exists() {
            read_cells(&workbook_path, &mut state)
                .map_err(|err| ToolError::external(SERVICE, operation, spreadsheet_id, err))?;
        }
        Ok(state)
    }

    fn save(&self, state: &WorkbookState, operation: &'static str) -> Result<()> {
        let id = state.metadata.id.as_str();
        let result = (|| -> Result<()> {
            let bytes = render_workbook(state)?;
            atomic_write(&self.workbook_path(id), &bytes)?;
            let layout = serde_json::to_vec_pretty(state)?;
            atomic_write(&self.layout_path(id), &layout)
        })();
        result.map_err(|err| ToolError::external(SERVICE, operation, id, err))?;
        debug!(spreadsheet = id, operation, "workbook saved");
        Ok(())
    }
}

impl SpreadsheetService for XlsxSpreadsheets {
    fn create_spreadsheet(
        &mut self,
        name: &str,
        sheet_names: &[String],
    ) -> Result<SpreadsheetMetadata> {
        let root = self.root.clone();
        let state = WorkbookState::new(
            name,
            |id| format!("file://{}", root.join(format!("{id}.xlsx")).display()),
            sheet_names,
        );
        self.save(&state, "create_spreadsheet")?;
        Ok(state.metadata)
    }

    fn spreadsheet_metadata(&self, spreadsheet_id: &str) -> Result<SpreadsheetMetadata> {
        Ok(self.load(spreadsheet_id, "spreadsheet_metadata")?.metadata)
    }

    fn read_range(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<Vec<Row>> {
        let state = self.load(spreadsheet_id, "read_range")?;
        Ok(state.sheet(sheet_name)?.trimmed_rows())
    }

    fn batch_write_values(&mut self, spreadsheet_id: &str, data: &[ValueRange]) -> Result<()> {
        let mut state = self.load(spreadsheet_id, "batch_write_values")?;
        state.write_values(data)?;
        self.save(&state, "batch_write_values")
    }

    fn batch_apply_formatting(
        &mut self,
        spreadsheet_id: &str,
        requests: &[FormatRequest],
    ) -> Result<()> {
        let mut state = self.load(spreadsheet_id, "batch_apply_formatting")?;
        state.apply_formatting(requests)?;
        self.save(&state, "batch_apply_formatting")
    }
}

/// Excel-safe, unique worksheet names for the logical sheet names.
pub fn worksheet_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();
    names
        .map(|name| {
            let base = sanitize_sheet_name(name);
            let mut candidate = base.clone();
            let mut suffix = 1;
            while !taken.insert(candidate.to_lowercase()) {
                let tag = format!("~{suffix}");
                let keep = 31usize.saturating_sub(tag.chars().count());
                candidate = format!("{}{tag}", base.chars().take(keep).collect::<String>());
                suffix += 1;
            }
            candidate
        })
        .collect()
}

fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();
    let sanitized = sanitized.trim().trim_matches('\'');
    if sanitized.is_empty() {
        return "Sheet".to_string();
    }
    sanitized.chars().take(31).collect()
}

fn read_cells(path: &Path, state: &mut WorkbookState) -> Result<()> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let names = worksheet_names(state.metadata.sheets.iter().map(|sheet| sheet.name.as_str()));

    for (properties, worksheet) in state.metadata.sheets.iter().zip(names) {
        let mut rows: Vec<Row> = Vec::new();
        if let Some(range) = workbook.worksheet_range(&worksheet) {
            overlay(&mut rows, &range?, cell_to_string);
        }
        if let Some(formulas) = workbook.worksheet_formula(&worksheet) {
            overlay(&mut rows, &formulas?, |cell| {
                if cell.is_empty() {
                    String::new()
                } else {
                    format!("={cell}")
                }
            });
        }
        state.sheets.entry(properties.id).or_default().rows = rows;
    }
    Ok(())
}

fn overlay<T>(rows: &mut Vec<Row>, range: &Range<T>, render: impl Fn(&T) -> String)
where
    T: calamine::CellType,
{
    let Some((start_row, start_column)) = range.start() else {
        return;
    };
    for (row_offset, cells) in range.rows().enumerate() {
        for (column_offset, cell) in cells.iter().enumerate() {
            let value = render(cell);
            if value.is_empty() {
                continue;
            }
            let row_index = start_row as usize + row_offset;
            let column_index = start_column as usize + column_offset;
            if rows.len() <= row_index {
                rows.resize_with(row_index + 1, Row::new);
            }
            let row = &mut rows[row_index];
            if row.len() <= column_index {
                row.resize(column_index + 1, String::new());
            }
            row[column_index] = value;
        }
    }
}

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::String(value) => value.clone(),
        DataType::Float(value) => value.to_string(),
        DataType::Int(value) => value.to_string(),
        DataType::Bool(value) => value.to_string(),
        DataType::Empty => String::new(),
        other => other.to_string(),
    }
}

fn render_workbook(state: &WorkbookState) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::Black);
    let unlocked = Format::new().set_unlocked();
    let unlocked_header = header.clone().set_unlocked();

    let names = worksheet_names(state.metadata.sheets.iter().map(|sheet| sheet.name.as_str()));
    for (properties, worksheet_name) in state.metadata.sheets.iter().zip(names) {
        let default_sheet = SheetState::default();
        let sheet = state.sheets.get(&properties.id).unwrap_or(&default_sheet);
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&worksheet_name)?;
        render_sheet(worksheet, sheet, &header, &unlocked, &unlocked_header)?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn render_sheet(
    worksheet: &mut Worksheet,
    sheet: &SheetState,
    header: &Format,
    unlocked: &Format,
    unlocked_header: &Format,
) -> Result<()> {
    let styled_header = sheet
        .formatting
        .iter()
        .any(|request| matches!(request, FormatRequest::HeaderStyle { .. }));
    let protected: Vec<(u32, u16, u16)> = sheet
        .formatting
        .iter()
        .filter_map(|request| match request {
            FormatRequest::ProtectRange {
                start_row,
                start_column,
                end_column,
                ..
            } => Some((*start_row, *start_column, *end_column)),
            _ => None,
        })
        .collect();
    let is_locked = |row: u32, column: u16| {
        protected
            .iter()
            .any(|(start, from, to)| row >= *start && column >= *from && column < *to)
    };
    let width = sheet.rows.iter().map(Vec::len).max().unwrap_or(0);

    for (row_index, row) in sheet.rows.iter().enumerate() {
        let row_index = row_index as u32;
        for column_index in 0..width {
            let column = column_index as u16;
            let value = row.get(column_index).map(String::as_str).unwrap_or("");
            let locked = protected.is_empty() || is_locked(row_index, column);
            let format = match (row_index == 0 && styled_header, locked) {
                (true, true) => Some(header),
                (true, false) => Some(unlocked_header),
                (false, true) => None,
                (false, false) => Some(unlocked),
            };
            write_cell(worksheet, row_index, column, value, format)?;
        }
    }

    for request in &sheet.formatting {
        match request {
            FormatRequest::FreezeRows { rows, .. } => {
                worksheet.set_freeze_panes(*rows, 0)?;
            }
            FormatRequest::ColumnWidth {
                start_column,
                end_column,
                pixels,
                ..
            } => {
                let end = end_column.unwrap_or(width.max(1) as u16);
                for column in *start_column..end {
                    worksheet.set_column_width_pixels(column, *pixels)?;
                }
            }
            _ => {}
        }
    }

    if !protected.is_empty() {
        worksheet.protect();
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    column: u16,
    value: &str,
    format: Option<&Format>,
) -> Result<()> {
    match (value, format) {
        ("", Some(format)) => {
            worksheet.write_blank(row, column, format)?;
        }
        ("", None) => {}
        (formula, Some(format)) if formula.starts_with('=') => {
            worksheet.write_formula_with_format(row, column, formula, format)?;
        }
        (formula, None) if formula.starts_with('=') => {
            worksheet.write_formula(row, column, formula)?;
        }
        (text, Some(format)) => {
            worksheet.write_string_with_format(row, column, text, format)?;
        }
        (text, None) => {
            worksheet.write_string(row, column, text)?;
        }
    }
    Ok(())
}
