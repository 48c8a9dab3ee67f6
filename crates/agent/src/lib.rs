//! The conversation loop — the heart of lalabot.
//!
//! Every text turn follows a **decide → act → ground** cycle:
//!
//! 1. **Decide**: send persona + history + the user's message to the model
//! 2. **Extract**: recover any `{"tool_name": ...}` requests from its answer
//! 3. **Act**: if there are tool calls, run them through the dispatcher
//! 4. **Ground**: stream a second answer built on the tool results
//! 5. **Present**: live-edit one message on the channel as text arrives
//!
//! Without tool calls the decision text is the answer and step 4 is
//! skipped. Exactly one tool round trip happens per turn.

pub mod dispatch;
pub mod extract;
pub mod handler;
pub mod model;
pub mod orchestrator;
pub mod presenter;
pub mod prompt;
pub mod session;
pub mod stream;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatch::Dispatcher;
pub use extract::{ExtractError, extract_candidate_blocks, parse_tool_calls, strip_think};
pub use handler::{BotHandler, Command};
pub use model::ModelClient;
pub use orchestrator::{Decision, Orchestrator, decide};
pub use presenter::{Presenter, safe_send};
pub use session::{SessionGuard, SessionManager};
pub use stream::{Chunking, Fragments};
