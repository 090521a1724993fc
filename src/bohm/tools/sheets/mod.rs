//! Spreadsheet service abstraction.
//!
//! The reconciliation engine only needs a handful of spreadsheet operations:
//! create a spreadsheet with named sheets, look up its metadata, read whole
//! sheets, write rectangular value blocks, and apply layout requests. Two
//! backends are provided: an in-memory one and an `.xlsx` directory.

use serde::{Deserialize, Serialize};

use crate::bohm::tools::error::Result;

pub mod memory;
pub mod xlsx;

pub use memory::MemorySpreadsheets;
pub use xlsx::XlsxSpreadsheets;

/// One sheet row. Empty strings are empty cells; strings starting with `=`
/// are formulas.
pub type Row = Vec<String>;

/// Identity of one sheet within a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetProperties {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetMetadata {
    pub id: String,
    pub name: String,
    pub url: String,
    pub sheets: Vec<SheetProperties>,
}

impl SpreadsheetMetadata {
    pub fn sheet_id(&self, name: &str) -> Option<u32> {
        self.sheets
            .iter()
            .find(|sheet| sheet.name == name)
            .map(|sheet| sheet.id)
    }
}

/// A block of values anchored at a zero-based cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRange {
    pub sheet_name: String,
    pub row: u32,
    pub column: u16,
    pub values: Vec<Row>,
}

impl ValueRange {
    pub fn new(sheet_name: impl Into<String>, row: u32, column: u16, values: Vec<Row>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            row,
            column,
            values,
        }
    }

    /// A1 reference of the anchor cell, e.g. `'General'!A2`.
    pub fn a1(&self) -> String {
        format!(
            "{}!{}{}",
            quote_sheet_name(&self.sheet_name),
            column_letter(self.column as usize),
            self.row + 1
        )
    }
}

/// Layout and structural requests. Row and column bounds are zero-based;
/// `end_*` bounds are exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FormatRequest {
    FreezeRows {
        sheet_id: u32,
        rows: u32,
    },
    /// Bold white text on black with clipped wrapping on the first row.
    HeaderStyle {
        sheet_id: u32,
    },
    /// Width for `start_column..end_column`, or every column when `end_column` is absent.
    ColumnWidth {
        sheet_id: u32,
        start_column: u16,
        end_column: Option<u16>,
        pixels: u16,
    },
    /// Locks `start_column..end_column` from `start_row` downwards.
    ProtectRange {
        sheet_id: u32,
        start_row: u32,
        start_column: u16,
        end_column: u16,
    },
    /// Strict dropdown bound to the values of `source`.
    ListValidation {
        sheet_id: u32,
        start_row: u32,
        start_column: u16,
        end_column: u16,
        source: String,
        input_message: String,
    },
    DeleteRows {
        sheet_id: u32,
        start_index: u32,
        end_index: u32,
    },
    InsertRows {
        sheet_id: u32,
        start_index: u32,
        count: u32,
    },
}

impl FormatRequest {
    pub fn sheet_id(&self) -> u32 {
        match self {
            Self::FreezeRows { sheet_id, .. }
            | Self::HeaderStyle { sheet_id }
            | Self::ColumnWidth { sheet_id, .. }
            | Self::ProtectRange { sheet_id, .. }
            | Self::ListValidation { sheet_id, .. }
            | Self::DeleteRows { sheet_id, .. }
            | Self::InsertRows { sheet_id, .. } => *sheet_id,
        }
    }
}

/// Operations the engine needs from a spreadsheet backend.
pub trait SpreadsheetService {
    fn create_spreadsheet(
        &mut self,
        name: &str,
        sheet_names: &[String],
    ) -> Result<SpreadsheetMetadata>;

    /// Fails with `NotFound` when the spreadsheet does not exist.
    fn spreadsheet_metadata(&self, spreadsheet_id: &str) -> Result<SpreadsheetMetadata>;

    /// Every row of a sheet, header included.
    fn read_range(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<Vec<Row>>;

    fn batch_write_values(&mut self, spreadsheet_id: &str, data: &[ValueRange]) -> Result<()>;

    fn batch_apply_formatting(
        &mut self,
        spreadsheet_id: &str,
        requests: &[FormatRequest],
    ) -> Result<()>;
}

/// Spreadsheet column letter for a zero-based index: 0 → `A`, 27 → `AB`.
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut remaining = index + 1;
    while remaining > 0 {
        let digit = (remaining - 1) % 26;
        letters.push(char::from(b'A' + digit as u8));
        remaining = (remaining - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Quotes a sheet name for use in a cell reference.
pub fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}
