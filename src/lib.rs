//! Consolidation of monthly construction-site budgets.
//!
//! Each site-month folder holds one or more "Analisi" workbooks, one sheet
//! per construction phase. Sheets are normalized, cropped to their cost
//! table, categorized and validated into typed cost rows; rows are then
//! stamped with site and month and concatenated into the tabellone.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod consistency;
pub mod crop;
pub mod delta;
pub mod error;
pub mod loader;
pub mod logging;
pub mod normalize;
pub mod output;
pub mod rewrite;
pub mod rules;
pub mod sheet_specs;
pub mod tipologia;
pub mod types;
pub mod util;
pub mod validate;

pub use aggregate::{find_site_folders, load_loop_and_concat, read_all_valid_budgets, Consolidation, FolderBudget};
pub use cache::{flush_all_cache, read_full_budget_cached, Cache, CacheOutcome, CodeVersion};
pub use config::{CacheConfig, ExtractionOptions, RunConfig};
pub use delta::{get_tabellone_delta, DateInterval};
pub use error::{ConsolidaError, Result, SheetError};
pub use loader::{read_full_budget, BudgetExtraction};
pub use logging::{init_logging, Diagnostics, LogGuard};
pub use rewrite::apply_rewrites;
pub use types::{ConsolidatedRecord, ConsistencyReportEntry, CostRow, DeltaRow, RewriteRule};
