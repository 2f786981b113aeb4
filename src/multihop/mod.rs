// SPDX-License-Identifier: MIT

//! Multi-hop question answering
//!
//! An orchestrator routes between a question decomposer, a fact-recall
//! responder and a code-writing agent, with a progress assessor after every
//! worker step, until a final answer is synthesized.

pub mod agents;
pub mod coder;
pub mod config;
pub mod graph;
pub mod llm;
pub mod prompts;
pub mod runner;
pub mod server;
pub mod state;
pub mod usage;
