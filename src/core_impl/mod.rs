use super::*;

mod microtask_task_context;
mod promise_and_reactions;
mod promise_api;
mod timer_controls_and_execution;
mod trace_and_config;
