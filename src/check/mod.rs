mod types;
mod verifier;
mod result;
mod http;

pub use types::{CheckDef, CheckKind, HttpVia};
pub use verifier::Verifier;
pub use result::{CheckResult, CheckStatus, FailureKind, VerifyReport};
pub use http::{HttpProbe, json_field, json_equals};
