//! One module per subcommand family, each taking the shared [`crate::app::App`]
//! plus its own parsed arguments and returning the process exit code.

pub mod approval;
pub mod audit;
pub mod breakglass;
pub mod credential_process;
pub mod policy;
pub mod session;
pub mod trust_policy;
