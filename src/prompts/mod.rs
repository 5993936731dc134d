//! System prompt construction.
//!
//! - `delegation`: which agents an agent may hand work to, rendered into its prompt

pub mod delegation;

pub use delegation::{
    DELEGATION_SECTION_HEADER, DelegationTarget, build_system_prompt, format_delegation_section,
    get_delegation_targets, get_enumerated_agent_names, render_work_request,
};
