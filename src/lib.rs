pub mod error;
pub mod host;
pub mod inventory;
pub mod check;
pub mod suite;
pub mod diff;
pub mod report;

pub use error::{HostVerifyError, Result};
pub use host::{Host, ShellHost, MockHost, Transport, CommandOutput, FileInfo, ServiceState, PackageState, UserInfo};
pub use inventory::{HostSpec, Inventory};
pub use check::{
    CheckDef, CheckKind, HttpVia, Verifier,
    CheckResult, CheckStatus, FailureKind, VerifyReport,
};
pub use suite::{Suite, SuiteLoader, builtin_names};
pub use diff::{format_output_diff, has_changes};
pub use report::{render_console, render_table, render_json, render_yaml, Totals, ResultTableRow};
