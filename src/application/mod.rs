//! Use-case layer: routing, handlers, command delivery, runtime state

pub mod commands;
pub mod events;
pub mod handlers;
pub mod ports;
pub mod registry;
pub mod router;
pub mod transactions;

pub use commands::{
    CommandCallback, CommandConfig, CommandError, CommandManager, CommandSink,
    SharedCommandManager, SinkError,
};
pub use events::{Event, EventBus, SharedEventBus};
pub use handlers::{build_router, HandlerDeps};
pub use registry::{RegistryError, StatusRegistry};
pub use router::{ActionHandler, ActionRouter, CallContext, HandlerError, MessageProcessor};
pub use transactions::{TransactionContext, TransactionStore};
