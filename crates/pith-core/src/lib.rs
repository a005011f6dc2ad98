//! Turn orchestration: the Context Assembler, the Event Bus, compaction,
//! and the Runtime that ties them together with the Store, the Tool
//! Registry, and a Model.

mod bus;
mod compaction;
mod context;
mod event;
mod prompts;
mod runtime;

pub use bus::{EventBus, Subscription};
pub use compaction::{compact_session, needs_compaction, CompactionError, COMPACTION_MESSAGE_THRESHOLD, COMPACTION_TOKEN_THRESHOLD};
pub use context::{AssembledContext, ContextAssembler, ContextError};
pub use event::{EventEnvelope, TurnEvent, TurnStatus};
pub use runtime::{Runtime, RuntimeError};
