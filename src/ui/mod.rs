//! Terminal UI layer for interactive dispatch sessions.
//!
//! [`chat_loop`] owns the event loop, keyboard handling, and the spawned
//! engine tasks; [`layout`] builds the transcript lines and the scroll
//! math the loop renders with. Domain logic stays in [`crate::core`].

pub mod chat_loop;
pub mod layout;
