//! LLM-orchestrated case-method seminar engine.
//!
//! A session walks a typed discussion graph: a professor persona frames
//! questions, AI student personas answer in a planned order, an evaluator
//! routes between continuing, replanning, and closing topics, and one human
//! participant takes real turns through a polling gate on the message store.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `state` | canonical records and the aggregate session state |
//! | `engine` | graph nodes, transition guards, the driving loop |
//! | `steps` | one module per node: prompt, model call, validation |
//! | `prompts` | step preambles and prompt builders |
//! | `coerce` | tolerant JSON extraction from model text |
//! | `model` | completion client seam and the OpenAI-compatible client |
//! | `store` | Postgres / in-memory message persistence |
//! | `gate` | bounded polling for the human participant |
//! | `session` | session store seam and the driver surface |
//! | `config` | environment defaults with TOML overlay |
//! | `error` | error taxonomy with fault classes |

pub mod coerce;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod model;
pub mod prompts;
pub mod session;
pub mod state;
pub mod steps;
pub mod store;
