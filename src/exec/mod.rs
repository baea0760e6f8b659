//! External tool execution
//!
//! - **process**: blocking launch/wait of an external tool with captured
//!   output and an optional kill deadline
//! - **pool**: the worker pool that blocking jobs are submitted to

pub mod pool;
pub mod process;

pub use pool::{WorkerError, WorkerPool};
pub use process::{run, ExecError, ToolCommand, ToolOutput};
