//! Upload preview surface.
//!
//! [`TabularLoader`] turns an uploaded file and a handful of [`LoadOptions`]
//! into a [`Table`]. The file name suffix picks the decoder; workbooks list
//! their sheets through [`TabularLoader::inspect_sheets`] before one is loaded.

pub(crate) mod cache;
pub(crate) mod options;

use crate::error::ResultMessage;
use crate::error::SheetError;
use crate::preview::cache::CacheConfig;
use crate::preview::cache::CacheKey;
use crate::preview::cache::LoadCache;
use crate::preview::options::LoadOptions;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::csv::DelimitedOptions;
use crate::spreadsheet::open_spreadsheet;
use crate::spreadsheet::range::ColumnSelection;
use crate::spreadsheet::read_grid;
use crate::spreadsheet::Engine;
use crate::table::Table;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failure of a preview request. Nothing partial is ever returned with it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Unsupported file format '{file_name}'")]
    UnsupportedFormat { file_name: String },

    /// The bytes could not be decoded as the declared kind, or an option was invalid.
    #[error("{0}")]
    ParseError(String),
}

impl From<SheetError> for LoadError {
    fn from(e: SheetError) -> Self {
        LoadError::ParseError(e.to_string())
    }
}

/// Upload format, chosen by file name suffix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    Csv,
    Xlsx,
    Xls,
    Xlsb,
}

impl FileKind {
    /// Matches the suffix case-insensitively; any other name is unsupported.
    pub fn detect(file_name: &str) -> Result<FileKind, LoadError> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_ascii_lowercase());
        match extension.as_deref() {
            Some("csv") => Ok(FileKind::Csv),
            Some("xlsx") => Ok(FileKind::Xlsx),
            Some("xls") => Ok(FileKind::Xls),
            Some("xlsb") => Ok(FileKind::Xlsb),
            _ => Err(LoadError::UnsupportedFormat {
                file_name: file_name.to_owned(),
            }),
        }
    }

    pub const fn extension(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Xlsx => "xlsx",
            FileKind::Xls => "xls",
            FileKind::Xlsb => "xlsb",
        }
    }

    pub const fn is_spreadsheet(&self) -> bool {
        !matches!(self, FileKind::Csv)
    }
}

impl Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl Engine {
    /// Default decoder of a file kind; delimited text has none.
    pub const fn for_kind(kind: FileKind) -> Option<Engine> {
        match kind {
            FileKind::Csv => None,
            FileKind::Xlsx => Some(Engine::OpenXml),
            FileKind::Xls => Some(Engine::Biff8),
            FileKind::Xlsb => Some(Engine::Biff12),
        }
    }
}

/// An uploaded file held in memory. Cloning shares the bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    name: String,
    bytes: Arc<[u8]>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Upload {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn kind(&self) -> Result<FileKind, LoadError> {
        FileKind::detect(&self.name)
    }
}

/// Loads uploads into tables, optionally memoizing results.
#[derive(Debug, Default)]
pub struct TabularLoader {
    cache: Option<LoadCache>,
}

impl TabularLoader {
    /// A loader without memoization.
    pub fn new() -> Self {
        TabularLoader { cache: None }
    }

    /// A loader that keeps recent tables within the given bounds.
    pub fn with_cache(config: CacheConfig) -> Self {
        TabularLoader {
            cache: Some(LoadCache::new(config)),
        }
    }

    pub fn cache(&self) -> Option<&LoadCache> {
        self.cache.as_ref()
    }

    /// Sheet names of a workbook in file order.
    pub fn inspect_sheets(&self, bytes: &Arc<[u8]>, engine: Engine) -> Result<Vec<String>, LoadError> {
        let spreadsheet = open_spreadsheet(Arc::clone(bytes), engine).with_prefix(engine.id())?;
        let names = spreadsheet.sheet_names();
        debug!(%engine, sheets = names.len(), "listed sheets");
        Ok(names)
    }

    /// Sheet names of an uploaded workbook; delimited text has none.
    pub fn inspect_upload(&self, upload: &Upload) -> Result<Vec<String>, LoadError> {
        match Engine::for_kind(upload.kind()?) {
            Some(engine) => self.inspect_sheets(&upload.bytes, engine),
            None => Ok(Vec::new()),
        }
    }

    /// Decodes `bytes` as `kind` into a table.
    ///
    /// `sheet_name` defaults to the first sheet and `engine` to the decoder of
    /// `kind`; both are ignored for delimited text. The result only depends on
    /// the arguments, so equal requests may be answered from the cache.
    pub fn load(
        &self,
        bytes: &Arc<[u8]>,
        kind: FileKind,
        options: &LoadOptions,
        sheet_name: Option<&str>,
        engine: Option<Engine>,
    ) -> Result<Arc<Table>, LoadError> {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return load_table(bytes, kind, options, sheet_name, engine).map(Arc::new),
        };
        let key = CacheKey {
            bytes: Arc::clone(bytes),
            kind,
            options: options.clone(),
            sheet_name: sheet_name.map(str::to_owned),
            engine,
        };
        cache.get_or_try_insert_with(key, || load_table(bytes, kind, options, sheet_name, engine))
    }

    /// Loads an upload, rejecting unsupported names before reading any byte.
    pub fn load_upload(
        &self,
        upload: &Upload,
        options: &LoadOptions,
        sheet_name: Option<&str>,
        engine: Option<Engine>,
    ) -> Result<Arc<Table>, LoadError> {
        let kind = upload.kind()?;
        self.load(&upload.bytes, kind, options, sheet_name, engine)
    }
}

fn load_table(
    bytes: &Arc<[u8]>,
    kind: FileKind,
    options: &LoadOptions,
    sheet_name: Option<&str>,
    engine: Option<Engine>,
) -> Result<Table, LoadError> {
    let plan = options.row_plan();
    let mut criteria = Criteria {
        rows_limit: plan.raw_row_limit(),
        ..Criteria::default()
    };
    debug!(%kind, size = bytes.len(), rows_limit = ?criteria.rows_limit, "loading table");

    let grid = match engine.or(Engine::for_kind(kind)) {
        Some(engine) if kind.is_spreadsheet() => {
            if let Some(range) = options.column_range() {
                criteria.columns = Some(ColumnSelection::try_from(range)?);
            }
            let mut spreadsheet = open_spreadsheet(Arc::clone(bytes), engine).with_prefix(engine.id())?;
            read_grid(spreadsheet.as_mut(), sheet_name, &criteria).with_prefix(engine.id())?
        }
        _ => {
            let delimited = DelimitedOptions {
                rows_limit: criteria.rows_limit,
                parse_dates: options.parse_dates,
                ..DelimitedOptions::default()
            };
            crate::spreadsheet::csv::read_grid(bytes, &delimited).with_prefix("csv")?
        }
    };

    let (header, mut rows) = plan.apply(grid)?;
    if !kind.is_spreadsheet() {
        let width = header
            .as_ref()
            .map(Vec::len)
            .or_else(|| rows.first().map(Vec::len))
            .unwrap_or(0);
        crate::spreadsheet::csv::align_rows(&mut rows, width).with_prefix("csv")?;
    }
    let table = Table::from_grid(header, rows, &criteria.nulls)?;
    debug!(columns = table.columns().len(), rows = table.rows().len(), "table loaded");
    Ok(table)
}
