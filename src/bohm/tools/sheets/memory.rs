use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bohm::tools::error::{Result, ToolError};
use crate::bohm::tools::sheets::{
    FormatRequest, Row, SheetProperties, SpreadsheetMetadata, SpreadsheetService, ValueRange,
};

/// Cell contents and layout of one sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetState {
    #[serde(skip)]
    pub rows: Vec<Row>,
    /// Layout requests applied so far, excluding row insertion and deletion.
    pub formatting: Vec<FormatRequest>,
}

impl SheetState {
    fn write(&mut self, range: &ValueRange) {
        for (offset, values) in range.values.iter().enumerate() {
            let row_index = range.row as usize + offset;
            if self.rows.len() <= row_index {
                self.rows.resize_with(row_index + 1, Row::new);
            }
            let row = &mut self.rows[row_index];
            let start = range.column as usize;
            if row.len() < start + values.len() {
                row.resize(start + values.len(), String::new());
            }
            for (column, value) in values.iter().enumerate() {
                row[start + column] = value.clone();
            }
        }
    }

    fn apply(&mut self, request: &FormatRequest) {
        match request {
            FormatRequest::DeleteRows {
                start_index,
                end_index,
                ..
            } => {
                let start = (*start_index as usize).min(self.rows.len());
                let end = (*end_index as usize).clamp(start, self.rows.len());
                self.rows.drain(start..end);
            }
            FormatRequest::InsertRows {
                start_index, count, ..
            } => {
                let start = (*start_index as usize).min(self.rows.len());
                for _ in 0..*count {
                    self.rows.insert(start, Row::new());
                }
            }
            other => self.formatting.push(other.clone()),
        }
    }

    /// Rows with trailing empty cells and trailing empty rows removed.
    pub fn trimmed_rows(&self) -> Vec<Row> {
        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .map(|row| {
                let width = row
                    .iter()
                    .rposition(|cell| !cell.is_empty())
                    .map_or(0, |last| last + 1);
                row[..width].to_vec()
            })
            .collect();
        while rows.last().is_some_and(Vec::is_empty) {
            rows.pop();
        }
        rows
    }
}

/// A spreadsheet held in memory: metadata plus one state per sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkbookState {
    pub metadata: SpreadsheetMetadata,
    pub sheets: BTreeMap<u32, SheetState>,
}

impl WorkbookState {
    pub fn new(name: &str, url: impl FnOnce(&str) -> String, sheet_names: &[String]) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        let sheets: Vec<SheetProperties> = sheet_names
            .iter()
            .enumerate()
            .map(|(index, name)| SheetProperties {
                id: index as u32,
                name: name.clone(),
            })
            .collect();
        Self {
            metadata: SpreadsheetMetadata {
                url: url(&id),
                id,
                name: name.to_string(),
                sheets: sheets.clone(),
            },
            sheets: sheets
                .iter()
                .map(|sheet| (sheet.id, SheetState::default()))
                .collect(),
        }
    }

    pub fn sheet(&self, name: &str) -> Result<&SheetState> {
        self.metadata
            .sheet_id(name)
            .and_then(|id| self.sheets.get(&id))
            .ok_or_else(|| ToolError::not_found("sheet", name))
    }

    pub fn write_values(&mut self, data: &[ValueRange]) -> Result<()> {
        for range in data {
            let id = self
                .metadata
                .sheet_id(&range.sheet_name)
                .ok_or_else(|| ToolError::not_found("sheet", &range.sheet_name))?;
            self.sheets.entry(id).or_default().write(range);
        }
        Ok(())
    }

    pub fn apply_formatting(&mut self, requests: &[FormatRequest]) -> Result<()> {
        for request in requests {
            let sheet = self
                .sheets
                .get_mut(&request.sheet_id())
                .ok_or_else(|| ToolError::not_found("sheet", request.sheet_id().to_string()))?;
            sheet.apply(request);
        }
        Ok(())
    }
}

/// In-memory spreadsheet backend.
///
/// `fail_writes_after` makes value writes fail once the given number of
/// batches has succeeded, to exercise partial-failure handling.
#[derive(Debug, Default)]
pub struct MemorySpreadsheets {
    workbooks: BTreeMap<String, WorkbookState>,
    fail_writes_after: Option<usize>,
    write_batches: usize,
}

impl MemorySpreadsheets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_after(&mut self, batches: Option<usize>) {
        self.fail_writes_after = batches;
        self.write_batches = 0;
    }

    /// Number of value batches written so far.
    pub fn write_batches(&self) -> usize {
        self.write_batches
    }

    pub fn workbook(&self, spreadsheet_id: &str) -> Option<&WorkbookState> {
        self.workbooks.get(spreadsheet_id)
    }

    fn workbook_mut(&mut self, spreadsheet_id: &str) -> Result<&mut WorkbookState> {
        self.workbooks
            .get_mut(spreadsheet_id)
            .ok_or_else(|| ToolError::not_found("spreadsheet", spreadsheet_id))
    }
}

impl SpreadsheetService for MemorySpreadsheets {
    fn create_spreadsheet(
        &mut self,
        name: &str,
        sheet_names: &[String],
    ) -> Result<SpreadsheetMetadata> {
        let workbook = WorkbookState::new(name, |id| format!("memory://{id}"), sheet_names);
        let metadata = workbook.metadata.clone();
        self.workbooks.insert(metadata.id.clone(), workbook);
        Ok(metadata)
    }

    fn spreadsheet_metadata(&self, spreadsheet_id: &str) -> Result<SpreadsheetMetadata> {
        self.workbooks
            .get(spreadsheet_id)
            .map(|workbook| workbook.metadata.clone())
            .ok_or_else(|| ToolError::not_found("spreadsheet", spreadsheet_id))
    }

    fn read_range(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<Vec<Row>> {
        let workbook = self
            .workbooks
            .get(spreadsheet_id)
            .ok_or_else(|| ToolError::not_found("spreadsheet", spreadsheet_id))?;
        Ok(workbook.sheet(sheet_name)?.trimmed_rows())
    }

    fn batch_write_values(&mut self, spreadsheet_id: &str, data: &[ValueRange]) -> Result<()> {
        if self
            .fail_writes_after
            .is_some_and(|limit| self.write_batches >= limit)
        {
            return Err(ToolError::external(
                "spreadsheet",
                "batch_write_values",
                spreadsheet_id,
                "quota exceeded",
            ));
        }
        self.workbook_mut(spreadsheet_id)?.write_values(data)?;
        self.write_batches += 1;
        Ok(())
    }

    fn batch_apply_formatting(
        &mut self,
        spreadsheet_id: &str,
        requests: &[FormatRequest],
    ) -> Result<()> {
        self.workbook_mut(spreadsheet_id)?.apply_formatting(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_extend_rows_and_deletes_shift_them() {
        let mut service = MemorySpreadsheets::new();
        let metadata = service
            .create_spreadsheet("Review", &["Data".to_string()])
            .expect("created");
        let rows: Vec<Row> = (0..4).map(|i| vec![format!("r{i}")]).collect();
        service
            .batch_write_values(&metadata.id, &[ValueRange::new("Data", 0, 0, rows)])
            .expect("written");
        service
            .batch_apply_formatting(
                &metadata.id,
                &[FormatRequest::DeleteRows {
                    sheet_id: 0,
                    start_index: 1,
                    end_index: 3,
                }],
            )
            .expect("deleted");

        let rows = service.read_range(&metadata.id, "Data").expect("read");
        assert_eq!(rows, vec![vec!["r0".to_string()], vec!["r3".to_string()]]);
    }

    #[test]
    fn unknown_spreadsheet_is_not_found() {
        let service = MemorySpreadsheets::new();
        let error = service.spreadsheet_metadata("missing").expect_err("missing");
        assert!(error.is_skippable());
    }
}
