pub mod catalog;
pub mod checkout;
pub mod dispatcher;
pub mod registry;

pub use catalog::{SendCatalogTool, CATALOG_FILE_NAME, CATALOG_MIME_TYPE};
pub use checkout::FinalizeCheckoutTool;
pub use dispatcher::{dispatch, recognize, DispatchOutcome, DispatchState};
pub use registry::{ToolEffect, ToolExecution, ToolHandler, ToolKind, ToolRegistry};
