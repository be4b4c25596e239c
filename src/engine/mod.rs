//! Pick-list navigation: routes made of named steps, a per-route session,
//! a back-stack and the navigator that feeds user input to the steps.

pub mod completion;
pub mod navigator;
pub mod prompt;
pub mod registry;
pub mod session;

pub use navigator::{Navigator, Outcome};
pub use registry::{Completion, HandlerFuture, Registry, StateDefinition, Transition};
pub use session::{SessionContext, Value};
